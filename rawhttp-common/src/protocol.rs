//! # HTTP/1.1 Wire Codec
//!
//! Purpose: Convert between logical messages and HTTP/1.1 byte sequences
//! without touching the network.
//!
//! ## Design Principles
//! 1. **Pure Transformation**: Encoders append to a caller-provided buffer,
//!    parsers read a borrowed slice. No sockets, no clocks.
//! 2. **Restartable Parsing**: The accumulated buffer is re-parsed from the
//!    start after every read; a partial message yields `Ok(None)` and the
//!    same call is repeated once more bytes arrive.
//! 3. **Head/Body Split**: The head ends at the first blank line, so header
//!    values may contain colons and bodies may contain CRLF.
//! 4. **Bounded Buffers**: Every parser carries a byte ceiling; messages past
//!    it fail instead of growing the buffer without limit.
//!
//! ## Wire Layout
//!
//! ```text
//! request:  METHOD SP TARGET SP VERSION CRLF (Key: Value CRLF)* CRLF [body]
//! response: VERSION SP STATUS SP REASON CRLF (Key: Value CRLF)* CRLF [body]
//! ```
//!
//! Transfer codings are not understood: body extent is `Content-Length` only.

use bytes::Bytes;

use crate::error::ParseError;
use crate::types::{
    content_length_header, Headers, Method, Response, CONTENT_LENGTH, HTTP_VERSION,
};

/// Line separator.
pub const CRLF: &[u8] = b"\r\n";

/// Separator between head and body.
const HEAD_END: &[u8] = b"\r\n\r\n";

/// Default ceiling for a buffered message (2 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 2 * 1024 * 1024;

/// Encodes a request into `out`.
///
/// When a payload is present `Content-Length` is set to its length,
/// replacing any differently-cased variant in `headers`. The caller's header
/// map is left untouched.
pub fn encode_request(
    method: Method,
    target: &str,
    version: &str,
    headers: &Headers,
    payload: Option<&[u8]>,
    out: &mut Vec<u8>,
) {
    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.push(b' ');
    out.extend_from_slice(version.as_bytes());
    out.extend_from_slice(CRLF);

    for (name, value) in headers {
        if payload.is_some() && name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }
        push_header(out, name, value);
    }
    if let Some(payload) = payload {
        push_content_length(out, payload.len());
    }
    out.extend_from_slice(CRLF);

    if let Some(payload) = payload {
        out.extend_from_slice(payload);
    }
}

/// Encodes a response into `out`, always declaring `Content-Length`.
pub fn encode_response(
    status: u16,
    reason: &str,
    headers: &Headers,
    body: &[u8],
    out: &mut Vec<u8>,
) {
    out.extend_from_slice(HTTP_VERSION.as_bytes());
    out.push(b' ');
    push_usize(out, status as usize);
    out.push(b' ');
    out.extend_from_slice(reason.as_bytes());
    out.extend_from_slice(CRLF);

    for (name, value) in headers {
        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }
        push_header(out, name, value);
    }
    push_content_length(out, body.len());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(body);
}

/// Incremental response parser for one exchange.
///
/// The parser is stateless apart from its configuration: every call parses
/// the entire buffer it is given.
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser {
    method: Method,
    max_len: usize,
}

impl ResponseParser {
    /// Creates a parser for the response to a `method` request.
    pub fn new(method: Method) -> Self {
        ResponseParser {
            method,
            max_len: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Overrides the byte ceiling.
    pub fn with_limit(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Attempts to parse a complete response.
    ///
    /// **Output**: `Ok(Some(_))` once the head and the declared body are
    /// present, `Ok(None)` while more bytes are needed.
    pub fn parse(&self, buf: &[u8]) -> Result<Option<Response>, ParseError> {
        if buf.len() > self.max_len {
            return Err(ParseError::TooLarge { limit: self.max_len });
        }
        let Some(head_end) = find_head_end(buf) else {
            return Ok(None);
        };

        let mut response = parse_response_head(&buf[..head_end])?;
        let expected = self.body_len(&response)?;
        let body = &buf[head_end + HEAD_END.len()..];
        if body.len() < expected {
            return Ok(None);
        }

        response.body = String::from_utf8_lossy(&body[..expected]).into_owned();
        Ok(Some(response))
    }

    /// Parses what arrived before the peer closed the stream.
    ///
    /// The head must be complete; the body is whatever was received, capped at
    /// the declared length.
    pub fn finish(&self, buf: &[u8]) -> Result<Response, ParseError> {
        let head_end = find_head_end(buf).ok_or(ParseError::Incomplete)?;
        let mut response = parse_response_head(&buf[..head_end])?;
        let expected = self.body_len(&response)?;
        let body = &buf[head_end + HEAD_END.len()..];
        let take = body.len().min(expected);
        response.body = String::from_utf8_lossy(&body[..take]).into_owned();
        Ok(response)
    }

    fn body_len(&self, response: &Response) -> Result<usize, ParseError> {
        let bodiless = !self.method.expects_response_body()
            || (100..200).contains(&response.status)
            || response.status == 204
            || response.status == 304;
        if bodiless {
            return Ok(0);
        }

        match usize::try_from(response.content_length) {
            Ok(len) if len <= self.max_len => Ok(len),
            _ => Err(ParseError::TooLarge { limit: self.max_len }),
        }
    }
}

/// Request received by the demo server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
}

/// Server-side request parser.
#[derive(Debug, Clone, Copy)]
pub struct RequestParser {
    max_len: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        RequestParser {
            max_len: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl RequestParser {
    /// Creates a parser with a custom byte ceiling.
    pub fn with_limit(max_len: usize) -> Self {
        RequestParser { max_len }
    }

    /// Attempts to parse one request from the front of `buf`.
    ///
    /// Returns the request and the number of bytes it occupied so the caller
    /// can advance past it on a keep-alive connection.
    pub fn parse(&self, buf: &[u8]) -> Result<Option<(ParsedRequest, usize)>, ParseError> {
        let Some(head_end) = find_head_end(buf) else {
            if buf.len() > self.max_len {
                return Err(ParseError::TooLarge { limit: self.max_len });
            }
            return Ok(None);
        };

        let head = String::from_utf8_lossy(&buf[..head_end]);
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidRequestLine);
        };
        if method.is_empty() || target.is_empty() || !version.starts_with("HTTP/") {
            return Err(ParseError::InvalidRequestLine);
        }

        let headers = parse_header_lines(lines);
        let body_len = match content_length_header(&headers) {
            Some(value) => parse_content_length(value)?,
            None => 0,
        };
        let body_len = match usize::try_from(body_len) {
            Ok(len) if len <= self.max_len => len,
            _ => return Err(ParseError::TooLarge { limit: self.max_len }),
        };

        let body_start = head_end + HEAD_END.len();
        if buf.len() < body_start + body_len {
            return Ok(None);
        }

        let request = ParsedRequest {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
            body: Bytes::copy_from_slice(&buf[body_start..body_start + body_len]),
        };
        Ok(Some((request, body_start + body_len)))
    }
}

fn parse_response_head(head: &[u8]) -> Result<Response, ParseError> {
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().filter(|v| !v.is_empty()).ok_or(ParseError::InvalidStatusLine)?;
    let status = parts.next().ok_or(ParseError::InvalidStatusLine)?;
    let status = status.parse::<u16>().map_err(ParseError::InvalidStatus)?;
    let description = parts.next().unwrap_or_default();

    let headers = parse_header_lines(lines);
    let content_length = match content_length_header(&headers) {
        Some(value) => parse_content_length(value)?,
        None => 0,
    };

    Ok(Response {
        version: version.to_string(),
        status,
        description: description.to_string(),
        headers,
        content_length,
        body: String::new(),
        error: None,
    })
}

// Lines without a colon, or with whitespace in the name, are skipped.
fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Headers {
    let mut headers = Headers::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            continue;
        }
        headers.insert(name.to_string(), value.trim().to_string());
    }
    headers
}

fn parse_content_length(value: &str) -> Result<u64, ParseError> {
    value.trim().parse::<u64>().map_err(ParseError::InvalidContentLength)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_END.len()).position(|w| w == HEAD_END)
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(CRLF);
}

fn push_content_length(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(CONTENT_LENGTH.as_bytes());
    out.extend_from_slice(b": ");
    push_usize(out, len);
    out.extend_from_slice(CRLF);
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Digits go through a stack buffer, no temporary String.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encodes_get_without_body() {
        let mut out = Vec::new();
        let hdrs = headers(&[("Host", "localhost:80"), ("Accept", "*/*")]);
        encode_request(Method::Get, "/hello", HTTP_VERSION, &hdrs, None, &mut out);
        assert_eq!(
            out,
            b"GET /hello HTTP/1.1\r\nAccept: */*\r\nHost: localhost:80\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn encoded_body_follows_blank_line_and_matches_content_length() {
        let mut out = Vec::new();
        let hdrs = headers(&[("Host", "h"), ("content-length", "999")]);
        let payload = "{\"a\":\"line\r\nbreak\"}";
        let sent = Some(payload.as_bytes());
        encode_request(Method::Post, "/json", HTTP_VERSION, &hdrs, sent, &mut out);

        let text = String::from_utf8(out).unwrap();
        let (head, sent) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(sent, payload);
        assert!(head.contains(&format!("Content-Length: {}", payload.len())));
        assert!(!head.contains("content-length"));
    }

    #[test]
    fn empty_body_declares_zero_length() {
        let mut out = Vec::new();
        let empty = Headers::new();
        encode_request(Method::Post, "/", HTTP_VERSION, &empty, Some(&b""[..]), &mut out);
        assert!(out.ends_with(b"Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn parses_complete_response() {
        let parser = ResponseParser::new(Method::Get);
        let response = parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap()
            .unwrap();
        assert_eq!(response.version, "HTTP/1.1");
        assert_eq!(response.status, 200);
        assert_eq!(response.description, "OK");
        assert_eq!(response.content_length, 5);
        assert_eq!(response.body, "hello");
        assert!(response.error.is_none());
    }

    #[test]
    fn partial_head_and_body_need_more() {
        let parser = ResponseParser::new(Method::Get);
        assert!(parser.parse(b"").unwrap().is_none());
        assert!(parser.parse(b"HTTP/1.1 200 OK\r\nContent-Le").unwrap().is_none());
        assert!(parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel")
            .unwrap()
            .is_none());
    }

    #[test]
    fn any_chunking_yields_the_same_response() {
        let wire: &[u8] =
            b"HTTP/1.1 201 Created Now\r\nX-Trace: a:b:c\r\nContent-Length: 12\r\n\r\nline1\r\nline2";
        let parser = ResponseParser::new(Method::Post);
        let whole = parser.parse(wire).unwrap().unwrap();

        let mut buf = Vec::new();
        let mut last = None;
        for byte in wire {
            buf.push(*byte);
            if let Some(response) = parser.parse(&buf).unwrap() {
                last = Some(response);
                break;
            }
        }
        let byte_wise = last.unwrap();
        assert_eq!(buf.len(), wire.len());
        assert_eq!(byte_wise.status, whole.status);
        assert_eq!(byte_wise.description, "Created Now");
        assert_eq!(byte_wise.headers, whole.headers);
        assert_eq!(byte_wise.body, whole.body);
        assert_eq!(byte_wise.body, "line1\r\nline2");
        assert_eq!(byte_wise.header("X-Trace"), Some("a:b:c"));
    }

    #[test]
    fn missing_content_length_means_empty_body() {
        let parser = ResponseParser::new(Method::Get);
        let response = parser.parse(b"HTTP/1.1 404 Not Found\r\n\r\n").unwrap().unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.content_length, 0);
        assert!(response.body.is_empty());
    }

    #[test]
    fn malformed_header_lines_are_skipped() {
        let parser = ResponseParser::new(Method::Get);
        let response = parser
            .parse(b"HTTP/1.1 200 OK\r\ngarbage line\r\nServer: demo\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("Server"), Some("demo"));
    }

    #[test]
    fn non_numeric_status_is_parse_error() {
        let parser = ResponseParser::new(Method::Get);
        let err = parser.parse(b"HTTP/1.1 OK fine\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidStatus(_)));
    }

    #[test]
    fn invalid_content_length_is_parse_error() {
        let parser = ResponseParser::new(Method::Get);
        let err = parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: -3\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength(_)));
    }

    #[test]
    fn head_response_ignores_declared_length() {
        let parser = ResponseParser::new(Method::Head);
        let response = parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(response.content_length, 42);
        assert!(response.body.is_empty());
    }

    #[test]
    fn oversized_message_is_rejected() {
        let parser = ResponseParser::new(Method::Get).with_limit(16);
        let err = parser
            .parse(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::TooLarge { limit: 16 }));
    }

    #[test]
    fn finish_returns_truncated_body_or_incomplete() {
        let parser = ResponseParser::new(Method::Get);
        let response = parser
            .finish(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc")
            .unwrap();
        assert_eq!(response.body, "abc");
        assert_eq!(parser.finish(b"HTTP/1.1 200").unwrap_err(), ParseError::Incomplete);
    }

    #[test]
    fn parses_pipelined_requests_with_offsets() {
        let wire = b"POST /json HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nhiGET /hello HTTP/1.1\r\n\r\n";
        let parser = RequestParser::default();
        let (first, used) = parser.parse(wire).unwrap().unwrap();
        assert_eq!(first.method, "POST");
        assert_eq!(first.target, "/json");
        assert_eq!(first.body, Bytes::from_static(b"hi"));

        let (second, rest) = parser.parse(&wire[used..]).unwrap().unwrap();
        assert_eq!(second.method, "GET");
        assert_eq!(second.target, "/hello");
        assert!(second.body.is_empty());
        assert_eq!(used + rest, wire.len());
    }

    #[test]
    fn rejects_bad_request_line() {
        let parser = RequestParser::default();
        let err = parser.parse(b"GET\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::InvalidRequestLine);
    }

    #[test]
    fn encodes_response_with_length() {
        let mut out = Vec::new();
        let hdrs = headers(&[("Content-Type", "text/plain")]);
        encode_response(200, "OK", &hdrs, b"World!", &mut out);
        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nWorld!".to_vec()
        );
    }
}
