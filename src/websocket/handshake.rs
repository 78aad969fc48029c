//! RFC 6455 opening handshake, both ends
//!
//! The server half exists for the in-process test peers.

use crate::ConnectionError;
use crate::network::Endpoint;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::{Buf, BytesMut};
use http::StatusCode;
use sha1::{Digest, Sha1};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HEADERS: usize = 32;
const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Fresh base64 `Sec-WebSocket-Key` nonce
pub fn generate_key() -> String {
    STANDARD.encode(uuid::Uuid::new_v4().as_bytes())
}

/// `Sec-WebSocket-Accept` value the server must answer `key` with
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Upgrade request the client sends
pub fn client_request(endpoint: &Endpoint, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        endpoint.path_and_query(),
        endpoint.authority(),
        key
    )
}

/// Reads into `buf` until a full HTTP head is buffered, returning its length
pub(crate) async fn read_head<S>(stream: &mut S, buf: &mut BytesMut) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok(pos + 4);
        }
        if buf.len() > MAX_HEAD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "handshake head too large",
            ));
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
}

fn header_has_token(value: &[u8], token: &str) -> bool {
    String::from_utf8_lossy(value)
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Performs the client half of the handshake on `stream`
///
/// Bytes the server sent after its response head stay in `buf`.
pub async fn client_handshake<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    endpoint: &Endpoint,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let rejected = |reason: String| ConnectionError::HandshakeRejected {
        target: endpoint.to_string(),
        reason,
    };

    // the remote never saw the upgrade if it cannot be written
    let unreachable = |source: io::Error| ConnectionError::Unreachable {
        target: endpoint.to_string(),
        source,
    };

    let key = generate_key();
    let request = client_request(endpoint, &key);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(unreachable)?;
    stream.flush().await.map_err(unreachable)?;

    let head_len = read_head(stream, buf)
        .await
        .map_err(|e| rejected(format!("failed to read upgrade response: {e}")))?;

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(&buf[..head_len]) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(rejected("truncated upgrade response".to_string()));
        }
        Err(e) => return Err(rejected(format!("malformed upgrade response: {e}"))),
    }

    let code = response.code.unwrap_or_default();
    if code != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
        return Err(rejected(format!("expected status 101, got {code}")));
    }

    let find = |name: &str| {
        response
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value)
    };
    if !find("upgrade").is_some_and(|v| header_has_token(v, "websocket")) {
        return Err(rejected("missing Upgrade: websocket".to_string()));
    }
    if !find("connection").is_some_and(|v| header_has_token(v, "upgrade")) {
        return Err(rejected("missing Connection: Upgrade".to_string()));
    }
    let expected = accept_key(&key);
    if find("sec-websocket-accept") != Some(expected.as_bytes()) {
        return Err(rejected("Sec-WebSocket-Accept mismatch".to_string()));
    }

    buf.advance(head_len);
    Ok(())
}

/// Performs the server half of the handshake on `stream`
///
/// Returns the request path on success. A request without a usable
/// `Sec-WebSocket-Key` is answered with 400 and reported as
/// `InvalidData`.
pub async fn server_handshake<S>(stream: &mut S, buf: &mut BytesMut) -> io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head_len = read_head(stream, buf).await?;

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    request
        .parse(&buf[..head_len])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let path = request.path.unwrap_or("/").to_string();
    let key = request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("sec-websocket-key"))
        .map(|h| String::from_utf8_lossy(h.value).trim().to_string());

    let Some(key) = key else {
        stream
            .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
            .await?;
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing Sec-WebSocket-Key",
        ));
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(&key)
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;

    buf.advance(head_len);
    Ok(path)
}
