use super::config::RequestProbeConfig;
use crate::network::Endpoint;
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEADERS: usize = 64;

/// Status, headers and framed body of an HTTP/1.1 response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

fn invalid_data(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// JSON POST to `endpoint`, without credentials
pub fn build_request(endpoint: &Endpoint, body: Vec<u8>) -> http::Result<Request<Vec<u8>>> {
    Request::builder()
        .method(Method::POST)
        .uri(endpoint.uri().clone())
        .header(header::HOST, endpoint.authority())
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::CONNECTION, "close")
        .body(body)
}

/// Serializes `request` in HTTP/1.1 wire format
pub fn encode_request(request: &Request<Vec<u8>>) -> Vec<u8> {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    let mut out = format!("{} {} HTTP/1.1\r\n", request.method(), target).into_bytes();
    for (name, value) in request.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(request.body());
    out
}

/// Reads more bytes into `buf`, enforcing the response size limit
async fn fill<S>(stream: &mut S, buf: &mut BytesMut, config: &RequestProbeConfig) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    if buf.len() >= config.max_response_size {
        return Err(invalid_data(format!(
            "response exceeds {} bytes",
            config.max_response_size
        )));
    }
    buf.reserve(config.buffer_size);
    stream.read_buf(buf).await
}

async fn fill_or_eof<S>(stream: &mut S, buf: &mut BytesMut, config: &RequestProbeConfig) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    if fill(stream, buf, config).await? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before the response was complete",
        ));
    }
    Ok(())
}

fn content_length(headers: &HeaderMap) -> io::Result<Option<usize>> {
    headers
        .get(header::CONTENT_LENGTH)
        .map(|value| {
            value
                .to_str()
                .map_err(invalid_data)?
                .trim()
                .parse::<usize>()
                .map_err(invalid_data)
        })
        .transpose()
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("chunked"))
}

/// Reads one response from `stream`
///
/// The body is framed by `Transfer-Encoding: chunked`, `Content-Length`,
/// or the end of the connection, in that order of precedence.
pub async fn read_response<S>(stream: &mut S, config: &RequestProbeConfig) -> io::Result<RawResponse>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(config.buffer_size);

    let (status, headers, head_len) = loop {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut raw_headers);
        if let httparse::Status::Complete(head_len) = response.parse(&buf).map_err(invalid_data)? {
            let status =
                StatusCode::from_u16(response.code.unwrap_or_default()).map_err(invalid_data)?;
            let mut headers = HeaderMap::new();
            for raw in response.headers.iter() {
                let name = HeaderName::from_bytes(raw.name.as_bytes()).map_err(invalid_data)?;
                let value = HeaderValue::from_bytes(raw.value).map_err(invalid_data)?;
                headers.append(name, value);
            }
            break (status, headers, head_len);
        }
        fill_or_eof(stream, &mut buf, config).await?;
    };
    buf.advance(head_len);

    let body = if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        Bytes::new()
    } else if is_chunked(&headers) {
        read_chunked(stream, &mut buf, config).await?
    } else if let Some(len) = content_length(&headers)? {
        if len > config.max_response_size {
            return Err(invalid_data(format!(
                "declared body of {len} bytes exceeds {} bytes",
                config.max_response_size
            )));
        }
        while buf.len() < len {
            fill_or_eof(stream, &mut buf, config).await?;
        }
        buf.split_to(len).freeze()
    } else {
        while fill(stream, &mut buf, config).await? > 0 {}
        buf.freeze()
    };

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

async fn read_chunked<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    config: &RequestProbeConfig,
) -> io::Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        match httparse::parse_chunk_size(buf) {
            Ok(httparse::Status::Complete((consumed, size))) => {
                let size = usize::try_from(size).map_err(invalid_data)?;
                if size == 0 {
                    // trailers are not used
                    return Ok(body.freeze());
                }
                if body.len() + size > config.max_response_size {
                    return Err(invalid_data(format!(
                        "chunked body exceeds {} bytes",
                        config.max_response_size
                    )));
                }
                let needed = consumed + size + 2;
                if buf.len() < needed {
                    fill_or_eof(stream, buf, config).await?;
                    continue;
                }
                body.extend_from_slice(&buf[consumed..consumed + size]);
                buf.advance(needed);
            }
            Ok(httparse::Status::Partial) => fill_or_eof(stream, buf, config).await?,
            Err(_) => return Err(invalid_data("invalid chunk size line")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8]) -> io::Result<RawResponse> {
        let mut reader = raw;
        read_response(&mut reader, &RequestProbeConfig::default()).await
    }

    #[test]
    fn test_encode_request() {
        let endpoint: Endpoint = "http://localhost:8080/api/sdsad".parse().unwrap();
        let request = build_request(&endpoint, br#"{"hello":"dsad"}"#.to_vec()).unwrap();
        let wire = String::from_utf8(encode_request(&request)).unwrap();

        assert!(wire.starts_with("POST /api/sdsad HTTP/1.1\r\n"));
        assert!(wire.contains("host: localhost:8080\r\n"));
        assert!(wire.contains("content-type: application/json\r\n"));
        assert!(wire.contains("content-length: 16\r\n"));
        assert!(!wire.to_ascii_lowercase().contains("cookie"));
        assert!(wire.ends_with("\r\n\r\n{\"hello\":\"dsad\"}"));
    }

    #[tokio::test]
    async fn test_content_length_body() {
        let response = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}trailing")
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"{}");
    }

    #[tokio::test]
    async fn test_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\n{\"a\r\n4\r\n\":1}\r\n0\r\n\r\n";
        let response = parse(raw).await.unwrap();
        assert_eq!(&response.body[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_close_delimited_body() {
        let response = parse(b"HTTP/1.1 500 Internal Server Error\r\n\r\noops")
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&response.body[..], b"oops");
    }

    #[tokio::test]
    async fn test_truncated_response() {
        let err = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = parse(b"HTTP/1.1 200 OK\r\nContent-").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let err = parse(b"NOT HTTP AT ALL\r\n\r\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_response_size_limit() {
        let config = RequestProbeConfig::default().with_max_response_size(4);
        let mut reader: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
        let err = read_response(&mut reader, &config).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
