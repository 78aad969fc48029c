use super::config::StreamProbeConfig;
use super::frame::{Frame, FrameCodec, OpCode};
use super::payload::Payload;
use super::state::{SessionEvent, SessionState};
use crate::common::{ProbeEvent, ProbeObserver};
use crate::network::Endpoint;
use crate::{ProbeError, TransportFault};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Normal closure status code
const CLOSE_NORMAL: u16 = 1000;

/// One open WebSocket channel and its lifecycle
///
/// A session only exists once the opening handshake has succeeded, so it
/// starts out `Open`. Every inbound data message read by [`next_payload`]
/// is bounced back to the remote side verbatim before the next one is read,
/// which keeps echoes in receipt order. The reply a [`round_trip`] waits for
/// is checked instead of bounced.
///
/// [`next_payload`]: ConnectionSession::next_payload
/// [`round_trip`]: ConnectionSession::round_trip
///
/// Sessions are owned by the invocation that opened them and are neither
/// `Clone` nor shared.
pub struct ConnectionSession<S = TcpStream> {
    target: Endpoint,
    state: SessionState,
    stream: S,
    read_buf: BytesMut,
    codec: FrameCodec,
    config: StreamProbeConfig,
    observer: Arc<dyn ProbeObserver>,
    last_sent: Option<Payload>,
    last_received: Option<Payload>,
}

impl<S> std::fmt::Debug for ConnectionSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream whose handshake already completed
    ///
    /// `read_buf` holds any bytes the server sent right after its
    /// handshake response.
    pub(crate) fn open(
        target: Endpoint,
        stream: S,
        read_buf: BytesMut,
        config: StreamProbeConfig,
        observer: Arc<dyn ProbeObserver>,
    ) -> Self {
        let codec = FrameCodec::client(config.max_payload_size);
        Self {
            target,
            state: SessionState::Open,
            stream,
            read_buf,
            codec,
            config,
            observer,
            last_sent: None,
            last_received: None,
        }
    }

    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Payload most recently written to the remote side
    pub fn last_sent(&self) -> Option<&Payload> {
        self.last_sent.as_ref()
    }

    /// Payload most recently received from the remote side
    pub fn last_received(&self) -> Option<&Payload> {
        self.last_received.as_ref()
    }

    /// Sends one data message
    pub async fn send(&mut self, payload: impl Into<Payload>) -> Result<(), TransportFault> {
        self.ensure_open()?;
        let payload = payload.into();

        if let Err(fault) = self.write_frame(payload.to_frame()).await {
            return Err(self.fault(fault));
        }
        debug!(endpoint = %self.target, size = payload.len(), "Sent payload");
        self.last_sent = Some(payload);
        Ok(())
    }

    /// Waits for the next data message and bounces it back
    ///
    /// Returns `None` once the remote side has closed the session.
    pub async fn next_payload(&mut self) -> Result<Option<Payload>, TransportFault> {
        let Some(payload) = self.receive().await? else {
            return Ok(None);
        };

        if let Err(fault) = self.write_frame(payload.to_frame()).await {
            return Err(self.fault(fault));
        }
        self.last_sent = Some(payload.clone());
        self.observer.notify(ProbeEvent::PayloadEchoed {
            target: &self.target,
            payload: &payload,
        });
        Ok(Some(payload))
    }

    /// Sends `payload` and checks that the next inbound message is identical
    ///
    /// The reply is consumed, not bounced, so consecutive round trips
    /// against an echo server each see their own reply.
    pub async fn round_trip(&mut self, payload: impl Into<Payload>) -> crate::Result<Payload> {
        let sent = payload.into();
        self.send(sent.clone()).await?;

        match self.receive().await? {
            Some(received) if received == sent => {
                self.observer.notify(ProbeEvent::EchoVerified {
                    target: &self.target,
                    payload: &received,
                });
                Ok(received)
            }
            Some(received) => Err(ProbeError::EchoMismatch { sent, received }),
            None => Err(TransportFault::NotOpen(self.state).into()),
        }
    }

    /// Bounces payloads until the remote side closes, returning how many
    /// were echoed
    pub async fn run_echo_loop(&mut self) -> Result<usize, TransportFault> {
        let mut echoed = 0;
        while self.next_payload().await?.is_some() {
            echoed += 1;
        }
        Ok(echoed)
    }

    /// Terminates the session; always ends in `Closed`
    pub async fn close(&mut self) {
        if self.state.is_open() && self.write_frame(Frame::close(CLOSE_NORMAL)).await.is_ok() {
            let limit = self.config.close_timeout;
            if timeout(limit, self.await_close_reply()).await.is_err() {
                debug!(endpoint = %self.target, ?limit, "No close reply from peer");
            }
        }
        let _ = self.stream.shutdown().await;
        self.transition(SessionEvent::CloseRequested);
    }

    /// Next data message with lifecycle bookkeeping, `None` after the
    /// peer's Close frame
    async fn receive(&mut self) -> Result<Option<Payload>, TransportFault> {
        self.ensure_open()?;

        let message = match self.read_message().await {
            Ok(message) => message,
            Err(fault) => return Err(self.fault(fault)),
        };
        let Some(payload) = message else {
            let _ = self.stream.shutdown().await;
            self.transition(SessionEvent::RemoteClosed);
            return Ok(None);
        };

        self.transition(SessionEvent::PayloadReceived);
        self.last_received = Some(payload.clone());
        Ok(Some(payload))
    }

    fn ensure_open(&self) -> Result<(), TransportFault> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(TransportFault::NotOpen(self.state))
        }
    }

    fn transition(&mut self, event: SessionEvent) {
        let from = self.state;
        let to = from.on(event);
        self.state = to;
        if from != to {
            self.observer.notify(ProbeEvent::Transition {
                target: &self.target,
                from,
                to,
            });
        }
    }

    fn fault(&mut self, fault: TransportFault) -> TransportFault {
        self.observer.notify(ProbeEvent::Fault {
            target: &self.target,
            fault: &fault,
        });
        self.transition(SessionEvent::TransportFault);
        fault
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportFault> {
        let mut out = BytesMut::new();
        self.codec.encode(frame, &mut out)?;
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, TransportFault> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                return Ok(frame);
            }

            self.read_buf.reserve(self.config.buffer_size);
            let read = self.stream.read_buf(&mut self.read_buf);
            let n = match self.config.read_timeout {
                Some(limit) => timeout(limit, read)
                    .await
                    .map_err(|_| TransportFault::Timeout(limit))??,
                None => read.await?,
            };
            if n == 0 {
                return Err(TransportFault::UnexpectedEof);
            }
        }
    }

    /// Next complete data message, `None` after the peer's Close frame
    async fn read_message(&mut self) -> Result<Option<Payload>, TransportFault> {
        let mut partial: Option<(OpCode, BytesMut)> = None;

        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OpCode::Ping => {
                    self.write_frame(Frame::new(OpCode::Pong, frame.payload)).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    debug!(endpoint = %self.target, code = ?frame.close_code(), "Peer closed");
                    let reply = match frame.close_code() {
                        Some(code) => Frame::close(code),
                        None => Frame::new(OpCode::Close, Bytes::new()),
                    };
                    if let Err(e) = self.write_frame(reply).await {
                        debug!(endpoint = %self.target, error = %e, "Failed to answer close");
                    }
                    return Ok(None);
                }
                OpCode::Text | OpCode::Binary => {
                    if partial.is_some() {
                        return Err(TransportFault::Protocol(
                            "new message started before the previous one finished".to_string(),
                        ));
                    }
                    if frame.fin {
                        return Payload::from_message(frame.opcode, frame.payload).map(Some);
                    }
                    partial = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
                }
                OpCode::Continuation => {
                    let Some((opcode, mut data)) = partial.take() else {
                        return Err(TransportFault::Protocol(
                            "continuation frame without a message".to_string(),
                        ));
                    };
                    if data.len() + frame.payload.len() > self.config.max_payload_size {
                        return Err(TransportFault::Protocol(format!(
                            "message exceeds limit of {} bytes",
                            self.config.max_payload_size
                        )));
                    }
                    data.extend_from_slice(&frame.payload);
                    if frame.fin {
                        return Payload::from_message(opcode, data.freeze()).map(Some);
                    }
                    partial = Some((opcode, data));
                }
            }
        }
    }

    async fn await_close_reply(&mut self) -> Result<(), TransportFault> {
        loop {
            if self.read_frame().await?.opcode == OpCode::Close {
                return Ok(());
            }
        }
    }
}
