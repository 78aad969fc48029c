//! In-process peers and observers for exercising the probes in tests
//!
//! These helpers play the remote side of a probe on a loopback socket.
//! They serve exactly one connection each.

use super::traits::{ProbeEvent, ProbeObserver};
use crate::websocket::frame::{Frame, FrameCodec, OpCode};
use crate::websocket::handshake;
use crate::websocket::{Payload, SessionState};
use crate::{ProbeError, Result};
use bytes::{Buf, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info};

const PEER_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Behaviour of a WebSocket test peer
#[derive(Debug, Clone)]
pub enum PeerMode {
    /// Echo every data message back once
    Echo,
    /// Send each payload in turn, collect the probe's reply to it, then
    /// close with status 1000
    Script(Vec<Payload>),
    /// Refuse the upgrade with the given HTTP status
    Reject(u16),
    /// Complete the handshake, then drop the connection without a Close frame
    Drop,
    /// Complete the handshake, then write these bytes verbatim
    Raw(Vec<u8>),
}

/// Running WebSocket test peer
pub struct PeerHandle {
    /// Address the peer listens on
    pub addr: SocketAddr,
    /// Data messages the peer received from the probe, in order
    pub received: mpsc::UnboundedReceiver<Payload>,
    /// Completes when the peer has finished with its connection
    pub task: JoinHandle<io::Result<()>>,
}

impl PeerHandle {
    /// `ws://` URI pointing at this peer
    pub fn ws_uri(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

async fn bind_loopback() -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| ProbeError::Config(format!("Failed to bind listener: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| ProbeError::Config(format!("Failed to get local address: {e}")))?;
    Ok((listener, addr))
}

/// Returns a loopback address nothing is listening on
pub async fn unused_addr() -> Result<SocketAddr> {
    let (listener, addr) = bind_loopback().await?;
    drop(listener);
    Ok(addr)
}

/// Starts a WebSocket peer that serves one connection in the given mode
pub async fn spawn_ws_peer(mode: PeerMode) -> Result<PeerHandle> {
    let (listener, addr) = bind_loopback().await?;
    let (tx, received) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let (stream, client) = listener.accept().await?;
        info!(%client, ?mode, "Test peer: accepted connection");
        let mut peer = WsPeer {
            stream,
            buf: BytesMut::new(),
            codec: FrameCodec::server(PEER_MAX_PAYLOAD),
            received: tx,
        };
        peer.serve(mode).await
    });

    Ok(PeerHandle {
        addr,
        received,
        task,
    })
}

struct WsPeer {
    stream: TcpStream,
    buf: BytesMut,
    codec: FrameCodec,
    received: mpsc::UnboundedSender<Payload>,
}

impl WsPeer {
    async fn serve(&mut self, mode: PeerMode) -> io::Result<()> {
        if let PeerMode::Reject(status) = mode {
            let head_len = handshake::read_head(&mut self.stream, &mut self.buf).await?;
            self.buf.advance(head_len);
            let response = format!("HTTP/1.1 {status} Rejected\r\nContent-Length: 0\r\n\r\n");
            self.stream.write_all(response.as_bytes()).await?;
            return self.stream.shutdown().await;
        }

        handshake::server_handshake(&mut self.stream, &mut self.buf).await?;

        match mode {
            PeerMode::Echo => self.echo().await,
            PeerMode::Script(payloads) => self.script(payloads).await,
            PeerMode::Drop => Ok(()),
            PeerMode::Raw(bytes) => {
                self.stream.write_all(&bytes).await?;
                self.stream.flush().await?;
                // hold the socket until the probe gives up
                let mut sink = [0u8; 1024];
                while let Ok(n) = self.stream.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
                Ok(())
            }
            PeerMode::Reject(_) => Ok(()),
        }
    }

    async fn echo(&mut self) -> io::Result<()> {
        loop {
            let Some(frame) = self.read_frame().await? else {
                return Ok(());
            };
            match frame.opcode {
                OpCode::Text | OpCode::Binary => {
                    let payload = self.record(frame)?;
                    self.write_frame(payload.to_frame()).await?;
                    debug!(size = payload.len(), "Test peer: echoed message");
                }
                OpCode::Ping => {
                    self.write_frame(Frame::new(OpCode::Pong, frame.payload))
                        .await?;
                }
                OpCode::Close => {
                    self.write_frame(Frame::close(frame.close_code().unwrap_or(1000)))
                        .await?;
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    async fn script(&mut self, payloads: Vec<Payload>) -> io::Result<()> {
        for payload in payloads {
            self.write_frame(payload.to_frame()).await?;
            loop {
                let Some(frame) = self.read_frame().await? else {
                    return Ok(());
                };
                if matches!(frame.opcode, OpCode::Text | OpCode::Binary) {
                    self.record(frame)?;
                    break;
                }
            }
        }

        self.write_frame(Frame::close(1000)).await?;
        while let Some(frame) = self.read_frame().await? {
            if frame.opcode == OpCode::Close {
                break;
            }
        }
        Ok(())
    }

    fn record(&mut self, frame: Frame) -> io::Result<Payload> {
        let payload = Payload::from_message(frame.opcode, frame.payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let _ = self.received.send(payload.clone());
        Ok(payload)
    }

    async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            if let Some(frame) = self
                .codec
                .decode(&mut self.buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                return Ok(Some(frame));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> io::Result<()> {
        let mut out = BytesMut::new();
        self.codec
            .encode(frame, &mut out)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.stream.write_all(&out).await?;
        self.stream.flush().await
    }
}

/// Canned HTTP response served by [`spawn_http_stub`]
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Send the body with `Transfer-Encoding: chunked`
    pub chunked: bool,
    /// Omit both `Content-Length` and chunking; the body ends at EOF
    pub close_delimited: bool,
}

impl StubResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
            chunked: false,
            close_delimited: false,
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            ..Self::new(status, body)
        }
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    pub fn close_delimited(mut self) -> Self {
        self.close_delimited = true;
        self
    }

    fn encode(&self) -> Vec<u8> {
        let reason = http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut head = format!("HTTP/1.1 {} {}\r\nConnection: close\r\n", self.status, reason);
        if let Some(content_type) = &self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }

        let mut out = Vec::new();
        if self.chunked {
            head.push_str("Transfer-Encoding: chunked\r\n\r\n");
            out.extend_from_slice(head.as_bytes());
            let mid = self.body.len() / 2;
            for chunk in [&self.body[..mid], &self.body[mid..]] {
                if !chunk.is_empty() {
                    out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                    out.extend_from_slice(chunk);
                    out.extend_from_slice(b"\r\n");
                }
            }
            out.extend_from_slice(b"0\r\n\r\n");
        } else {
            if !self.close_delimited {
                head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
            }
            head.push_str("\r\n");
            out.extend_from_slice(head.as_bytes());
            out.extend_from_slice(&self.body);
        }
        out
    }
}

/// Request captured by [`spawn_http_stub`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Starts an HTTP server that answers one request with `response`
///
/// The task resolves to the request it received.
pub async fn spawn_http_stub(
    response: StubResponse,
) -> Result<(JoinHandle<io::Result<RecordedRequest>>, SocketAddr)> {
    let (listener, addr) = bind_loopback().await?;

    let handle = tokio::spawn(async move {
        let (mut stream, client) = listener.accept().await?;
        info!(%client, status = response.status, "Test HTTP stub: accepted connection");

        let mut buf = BytesMut::new();
        let head_len = handshake::read_head(&mut stream, &mut buf).await?;

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut parsed = httparse::Request::new(&mut headers);
        parsed
            .parse(&buf[..head_len])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let method = parsed.method.unwrap_or_default().to_string();
        let path = parsed.path.unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = parsed
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_ascii_lowercase(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect();

        let content_length = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.advance(head_len);
        while buf.len() < content_length {
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        }
        let body = buf.split_to(content_length).to_vec();

        stream.write_all(&response.encode()).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        Ok(RecordedRequest {
            method,
            path,
            headers,
            body,
        })
    });

    Ok((handle, addr))
}

/// Starts a server that accepts one connection and never answers
pub async fn spawn_silent_server(hold: Duration) -> Result<(JoinHandle<()>, SocketAddr)> {
    let (listener, addr) = bind_loopback().await?;
    let handle = tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            tokio::time::sleep(hold).await;
            drop(stream);
        }
    });
    Ok((handle, addr))
}

/// Owned copy of a [`ProbeEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Transition { from: SessionState, to: SessionState },
    Echoed(Payload),
    Verified(Payload),
    ConnectFailed(String),
    Fault(String),
    Outcome { success: bool, elapsed_ms: f64 },
}

/// Observer that keeps every event for later inspection
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Only the state transitions, in order
    pub fn transitions(&self) -> Vec<(SessionState, SessionState)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Transition { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

impl ProbeObserver for RecordingObserver {
    fn notify(&self, event: ProbeEvent<'_>) {
        let recorded = match event {
            ProbeEvent::Transition { from, to, .. } => RecordedEvent::Transition { from, to },
            ProbeEvent::PayloadEchoed { payload, .. } => RecordedEvent::Echoed(payload.clone()),
            ProbeEvent::EchoVerified { payload, .. } => RecordedEvent::Verified(payload.clone()),
            ProbeEvent::ConnectFailed { error, .. } => RecordedEvent::ConnectFailed(error.to_string()),
            ProbeEvent::Fault { fault, .. } => RecordedEvent::Fault(fault.to_string()),
            ProbeEvent::Outcome(outcome) => RecordedEvent::Outcome {
                success: outcome.is_success(),
                elapsed_ms: outcome.elapsed_ms(),
            },
        };
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(recorded);
    }
}
