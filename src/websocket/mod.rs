//! WebSocket echo probe
//!
//! This module opens a long-lived WebSocket session against an endpoint,
//! bounces every inbound payload back verbatim, and tracks the session's
//! lifecycle as an explicit state machine.

pub mod config;
pub mod frame;
pub mod handshake;
pub mod payload;
pub mod probe;
pub mod session;
pub mod state;


pub use config::StreamProbeConfig;
pub use frame::{Frame, FrameCodec, OpCode, Role};
pub use payload::Payload;
pub use probe::StreamEchoProbe;
pub use session::ConnectionSession;
pub use state::{SessionEvent, SessionState};
