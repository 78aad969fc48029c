use super::frame::{Frame, OpCode};
use crate::TransportFault;
use bytes::Bytes;
use std::fmt;

/// One complete WebSocket data message
///
/// Equality is bit-for-bit and includes the message kind, so a text
/// message never equals a binary one with the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Builds a payload from a reassembled message
    ///
    /// Text messages must be valid UTF-8.
    pub fn from_message(opcode: OpCode, data: Bytes) -> Result<Self, TransportFault> {
        match opcode {
            OpCode::Text => String::from_utf8(data.to_vec())
                .map(Payload::Text)
                .map_err(|_| TransportFault::Protocol("text message is not valid UTF-8".to_string())),
            _ => Ok(Payload::Binary(data)),
        }
    }

    /// Single final frame carrying this payload
    pub fn to_frame(&self) -> Frame {
        match self {
            Payload::Text(text) => Frame::new(OpCode::Text, Bytes::copy_from_slice(text.as_bytes())),
            Payload::Binary(data) => Frame::new(OpCode::Binary, data.clone()),
        }
    }
}

/// Lossy preview used in log lines and error messages
impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "{text:?}"),
            Payload::Binary(data) => write!(
                f,
                "<{} bytes: {:?}>",
                data.len(),
                String::from_utf8_lossy(data)
            ),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(data))
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Binary(data)
    }
}
