use super::config::StreamProbeConfig;
use super::handshake;
use super::session::ConnectionSession;
use super::state::{SessionEvent, SessionState};
use crate::common::{ProbeEvent, ProbeObserver, TracingObserver};
use crate::network::{Endpoint, Scheme};
use crate::{ConnectionError, ProbeError};
use bytes::BytesMut;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// WebSocket echo probe
///
/// Opens sessions against a single endpoint. Each call to [`connect`]
/// yields an independent [`ConnectionSession`].
///
/// # Examples
///
/// ```no_run
/// use echoprobe::StreamEchoProbe;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let probe = StreamEchoProbe::new("ws://127.0.0.1:8080/ws".parse()?)?;
///     let mut session = probe.connect().await?;
///
///     let echoed = session.round_trip("ping").await?;
///     println!("Server echoed: {echoed}");
///
///     session.close().await;
///     Ok(())
/// }
/// ```
///
/// [`connect`]: StreamEchoProbe::connect
pub struct StreamEchoProbe {
    endpoint: Endpoint,
    config: StreamProbeConfig,
    observer: Arc<dyn ProbeObserver>,
}

impl StreamEchoProbe {
    /// Fails with [`ProbeError::Config`] unless `endpoint` is a `ws://` target
    pub fn new(endpoint: Endpoint) -> crate::Result<Self> {
        if endpoint.scheme() != Scheme::Ws {
            return Err(ProbeError::Config(format!(
                "WebSocket probe needs a ws:// endpoint, got {endpoint}"
            )));
        }
        Ok(Self {
            endpoint,
            config: StreamProbeConfig::default(),
            observer: Arc::new(TracingObserver),
        })
    }

    pub fn with_config(mut self, config: StreamProbeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &StreamProbeConfig {
        &self.config
    }

    /// Connects over TCP and performs the opening handshake
    ///
    /// Fails with [`ConnectionError`] when the target is unreachable, the
    /// handshake is rejected, or the connect timeout expires. No session
    /// exists in that case.
    pub async fn connect(&self) -> Result<ConnectionSession, ConnectionError> {
        let attempt = async {
            let stream = TcpStream::connect(self.endpoint.socket_target())
                .await
                .map_err(|source| ConnectionError::Unreachable {
                    target: self.endpoint.to_string(),
                    source,
                })?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(endpoint = %self.endpoint, error = %e, "Failed to set TCP_NODELAY");
            }
            self.handshake(stream).await
        };
        let result = self.within_connect_timeout(attempt).await;
        self.report(result)
    }

    /// Performs the opening handshake over an already-connected stream
    pub async fn connect_stream<S>(&self, stream: S) -> Result<ConnectionSession<S>, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.within_connect_timeout(self.handshake(stream)).await;
        self.report(result)
    }

    async fn handshake<S>(&self, mut stream: S) -> Result<ConnectionSession<S>, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut read_buf = BytesMut::with_capacity(self.config.buffer_size);
        handshake::client_handshake(&mut stream, &mut read_buf, &self.endpoint).await?;
        Ok(ConnectionSession::open(
            self.endpoint.clone(),
            stream,
            read_buf,
            self.config.clone(),
            self.observer.clone(),
        ))
    }

    async fn within_connect_timeout<T>(
        &self,
        attempt: impl Future<Output = Result<T, ConnectionError>>,
    ) -> Result<T, ConnectionError> {
        match self.config.connect_timeout {
            Some(limit) => timeout(limit, attempt).await.unwrap_or_else(|_| {
                Err(ConnectionError::Timeout {
                    target: self.endpoint.to_string(),
                    elapsed: limit,
                })
            }),
            None => attempt.await,
        }
    }

    fn report<T>(&self, result: Result<T, ConnectionError>) -> Result<T, ConnectionError> {
        let from = SessionState::Connecting;
        let to = match &result {
            Ok(_) => from.on(SessionEvent::HandshakeAccepted),
            Err(error) => {
                self.observer.notify(ProbeEvent::ConnectFailed {
                    target: &self.endpoint,
                    error,
                });
                from.on(SessionEvent::HandshakeRejected)
            }
        };
        self.observer.notify(ProbeEvent::Transition {
            target: &self.endpoint,
            from,
            to,
        });
        result
    }
}
