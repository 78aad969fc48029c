use super::config::RequestProbeConfig;
use super::outcome::RequestOutcome;
use super::protocol::{self, RawResponse};
use crate::common::{ProbeEvent, ProbeObserver, TracingObserver};
use crate::network::{Endpoint, Scheme};
use crate::{ProbeError, RequestError};
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::debug;

/// JSON request/response probe
///
/// Every call to [`send`] performs exactly one exchange and never retries.
///
/// # Examples
///
/// ```no_run
/// use echoprobe::RequestProbe;
/// use serde_json::json;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let probe = RequestProbe::new("http://localhost:8080/api/sdsad".parse()?)?;
///     let outcome = probe.send(&json!({"hello": "dsad"})).await;
///
///     println!("Request took {:.2} ms", outcome.elapsed_ms());
///     let data = outcome.into_result()?;
///     println!("Response data: {data}");
///     Ok(())
/// }
/// ```
///
/// [`send`]: RequestProbe::send
pub struct RequestProbe {
    endpoint: Endpoint,
    config: RequestProbeConfig,
    observer: Arc<dyn ProbeObserver>,
}

impl RequestProbe {
    /// Fails with [`ProbeError::Config`] unless `endpoint` is an `http://` target
    pub fn new(endpoint: Endpoint) -> crate::Result<Self> {
        if endpoint.scheme() != Scheme::Http {
            return Err(ProbeError::Config(format!(
                "request probe needs an http:// endpoint, got {endpoint}"
            )));
        }
        Ok(Self {
            endpoint,
            config: RequestProbeConfig::default(),
            observer: Arc::new(TracingObserver),
        })
    }

    pub fn with_config(mut self, config: RequestProbeConfig) -> Self {
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

    pub fn config(&self) -> &RequestProbeConfig {
        &self.config
    }

    /// Serializes `body`, POSTs it, and classifies the response
    ///
    /// The clock starts before serialization and stops after the response
    /// body has been decoded or the exchange has failed. The outcome is
    /// reported to the observer on every path.
    pub async fn send<T>(&self, body: &T) -> RequestOutcome
    where
        T: Serialize + ?Sized,
    {
        let started = Instant::now();

        let (request_body, status, result) = match serde_json::to_value(body) {
            Ok(value) => {
                let (status, result) = match self.exchange(&value).await {
                    Ok(response) => (Some(response.status), classify(response)),
                    Err(err) => (None, Err(err)),
                };
                (value, status, result)
            }
            Err(err) => (Value::Null, None, Err(RequestError::Encode(err))),
        };

        let outcome = RequestOutcome::finalize(
            self.endpoint.clone(),
            request_body,
            status,
            result,
            started.elapsed(),
        );
        self.observer.notify(ProbeEvent::Outcome(&outcome));
        outcome
    }

    async fn exchange(&self, body: &Value) -> Result<RawResponse, RequestError> {
        let payload = serde_json::to_vec(body).map_err(RequestError::Encode)?;
        let request = protocol::build_request(&self.endpoint, payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let wire = protocol::encode_request(&request);

        let attempt = async {
            let mut stream = TcpStream::connect(self.endpoint.socket_target()).await?;
            debug!(endpoint = %self.endpoint, size = wire.len(), "Dispatching request");
            stream.write_all(&wire).await?;
            stream.flush().await?;
            protocol::read_response(&mut stream, &self.config).await
        };

        let response = match self.config.timeout {
            Some(limit) => timeout(limit, attempt).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no response within {limit:?}"),
                )
            })??,
            None => attempt.await?,
        };
        debug!(
            endpoint = %self.endpoint,
            status = %response.status,
            size = response.body.len(),
            "Received response"
        );
        Ok(response)
    }
}

/// Accepts 2xx responses whose body is JSON
fn classify(response: RawResponse) -> Result<Value, RequestError> {
    if !response.status.is_success() {
        return Err(RequestError::HttpStatus {
            status: response.status,
        });
    }
    serde_json::from_slice(&response.body).map_err(RequestError::Decode)
}
