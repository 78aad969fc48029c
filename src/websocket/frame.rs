use crate::TransportFault;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Largest payload a control frame may carry
const MAX_CONTROL_PAYLOAD: usize = 125;

/// Frame opcodes from RFC 6455 section 5.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

impl TryFrom<u8> for OpCode {
    type Error = TransportFault;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(TransportFault::Protocol(format!(
                "unknown opcode {other:#x}"
            ))),
        }
    }
}

/// A single WebSocket frame with its payload already unmasked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            payload: payload.into(),
        }
    }

    /// Close frame carrying a status code and no reason
    pub fn close(code: u16) -> Self {
        Self::new(OpCode::Close, Bytes::copy_from_slice(&code.to_be_bytes()))
    }

    /// Status code of a Close frame, if present
    pub fn close_code(&self) -> Option<u16> {
        match (self.opcode, self.payload.as_ref()) {
            (OpCode::Close, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

/// Which end of the connection the codec serves
///
/// Clients mask what they send and reject masked input; servers do the
/// opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Length-prefixed WebSocket frame codec
#[derive(Debug, Clone)]
pub struct FrameCodec {
    role: Role,
    max_payload_size: usize,
}

impl FrameCodec {
    pub fn new(role: Role, max_payload_size: usize) -> Self {
        Self {
            role,
            max_payload_size,
        }
    }

    pub fn client(max_payload_size: usize) -> Self {
        Self::new(Role::Client, max_payload_size)
    }

    pub fn server(max_payload_size: usize) -> Self {
        Self::new(Role::Server, max_payload_size)
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// XOR `data` in place with the 4-byte masking key
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

fn new_mask() -> [u8; 4] {
    let nonce = uuid::Uuid::new_v4();
    let bytes = nonce.as_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TransportFault;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, TransportFault> {
        if src.len() < 2 {
            return Ok(None);
        }

        let (b0, b1) = (src[0], src[1]);
        if b0 & 0x70 != 0 {
            return Err(TransportFault::Protocol("reserved bits set".to_string()));
        }
        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::try_from(b0 & 0x0F)?;
        let masked = b1 & 0x80 != 0;

        match (self.role, masked) {
            (Role::Client, true) => {
                return Err(TransportFault::Protocol(
                    "server sent a masked frame".to_string(),
                ));
            }
            (Role::Server, false) => {
                return Err(TransportFault::Protocol(
                    "client sent an unmasked frame".to_string(),
                ));
            }
            _ => {}
        }

        let (len, mut header_len) = match b1 & 0x7F {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([src[2], src[3]]) as u64, 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&src[2..10]);
                (u64::from_be_bytes(raw), 10)
            }
            n => (n as u64, 2),
        };

        if opcode.is_control() && (!fin || len as usize > MAX_CONTROL_PAYLOAD) {
            return Err(TransportFault::Protocol(format!(
                "invalid control frame ({opcode:?}, fin={fin}, len={len})"
            )));
        }
        if len > self.max_payload_size as u64 {
            return Err(TransportFault::Protocol(format!(
                "frame of {len} bytes exceeds limit of {}",
                self.max_payload_size
            )));
        }

        let mask_offset = header_len;
        if masked {
            header_len += 4;
        }
        let total = header_len + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut raw = src.split_to(total);
        let mask = masked.then(|| {
            [
                raw[mask_offset],
                raw[mask_offset + 1],
                raw[mask_offset + 2],
                raw[mask_offset + 3],
            ]
        });
        raw.advance(header_len);
        if let Some(mask) = mask {
            apply_mask(&mut raw, mask);
        }

        Ok(Some(Frame {
            fin,
            opcode,
            payload: raw.freeze(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = TransportFault;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), TransportFault> {
        let len = frame.payload.len();
        dst.reserve(len + 14);

        let fin_bit = if frame.fin { 0x80 } else { 0 };
        dst.put_u8(fin_bit | frame.opcode as u8);

        let mask_bit = match self.role {
            Role::Client => 0x80,
            Role::Server => 0,
        };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match self.role {
            Role::Client => {
                let mask = new_mask();
                dst.put_slice(&mask);
                let start = dst.len();
                dst.put_slice(&frame.payload);
                apply_mask(&mut dst[start..], mask);
            }
            Role::Server => dst.put_slice(&frame.payload),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &mut FrameCodec, frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_rfc_unmasked_text_frame() {
        // RFC 6455 section 5.7: single-frame unmasked "Hello"
        let mut buf = BytesMut::from(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f][..]);
        let frame = FrameCodec::client(1024).decode(&mut buf).unwrap().unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(&frame.payload[..], b"Hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rfc_masked_text_frame() {
        // RFC 6455 section 5.7: single-frame masked "Hello"
        let mut buf = BytesMut::from(
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58][..],
        );
        let frame = FrameCodec::server(1024).decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"Hello");
    }

    #[test]
    fn test_client_frames_are_masked() {
        let buf = encode(&mut FrameCodec::client(1024), Frame::new(OpCode::Text, "ping"));
        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 0x80 | 4);
        assert_eq!(buf.len(), 2 + 4 + 4);

        let mut buf = buf;
        let frame = FrameCodec::server(1024).decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"ping");
    }

    #[test]
    fn test_extended_lengths() {
        let mut server = FrameCodec::server(1 << 20);
        let mut client = FrameCodec::client(1 << 20);

        let medium = vec![7u8; 300];
        let mut buf = encode(&mut server, Frame::new(OpCode::Binary, medium.clone()));
        assert_eq!(buf[1], 126);
        assert_eq!(client.decode(&mut buf).unwrap().unwrap().payload, medium);

        let large = vec![9u8; 70_000];
        let mut buf = encode(&mut server, Frame::new(OpCode::Binary, large.clone()));
        assert_eq!(buf[1], 127);
        assert_eq!(client.decode(&mut buf).unwrap().unwrap().payload, large);
    }

    #[test]
    fn test_partial_input_waits() {
        let full = encode(&mut FrameCodec::server(1024), Frame::new(OpCode::Text, "hello"));
        let mut codec = FrameCodec::client(1024);
        let mut buf = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(&decoded.unwrap().payload[..], b"hello");
            }
        }
    }

    #[test]
    fn test_client_rejects_masked_input() {
        let mut buf = encode(&mut FrameCodec::client(1024), Frame::new(OpCode::Text, "x"));
        let err = FrameCodec::client(1024).decode(&mut buf).unwrap_err();
        assert!(matches!(err, TransportFault::Protocol(_)));
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut buf = encode(&mut FrameCodec::server(1024), Frame::new(OpCode::Binary, vec![0u8; 200]));
        let err = FrameCodec::client(100).decode(&mut buf).unwrap_err();
        assert!(matches!(err, TransportFault::Protocol(_)));
    }

    #[test]
    fn test_rejects_bad_control_frames() {
        let mut fragmented_ping = BytesMut::from(&[0x09, 0x00][..]);
        assert!(FrameCodec::client(1024).decode(&mut fragmented_ping).is_err());

        let mut unknown = BytesMut::from(&[0x83, 0x00][..]);
        assert!(FrameCodec::client(1024).decode(&mut unknown).is_err());

        let mut reserved = BytesMut::from(&[0xC1, 0x00][..]);
        assert!(FrameCodec::client(1024).decode(&mut reserved).is_err());
    }

    #[test]
    fn test_close_code() {
        assert_eq!(Frame::close(1000).close_code(), Some(1000));
        assert_eq!(Frame::new(OpCode::Close, Bytes::new()).close_code(), None);
        assert_eq!(Frame::new(OpCode::Text, "ab").close_code(), None);
    }
}
