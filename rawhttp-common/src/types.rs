//! # Message Types
//!
//! Logical request/response values exchanged between the client, the codec
//! and the demo server.
//!
//! ## Design Principles
//! 1. **Plain Data**: `Response` is a pure value produced fresh per attempt.
//! 2. **Deterministic Headers**: `Headers` is an ordered map so wire output is
//!    stable across runs, which keeps tests exact.
//! 3. **Case Preserved**: Header names are stored exactly as written or
//!    received; only the `Content-Length` lookup ignores case.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{HttpError, HttpResult};

/// Protocol version written on every request line.
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Status used as the failure sentinel: anything at or above is a failure.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Header name carrying the body length.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Header mapping with unique, case-preserved keys.
pub type Headers = BTreeMap<String, String>;

/// Common `Content-Type` values.
pub mod content_type {
    pub const ANY: &str = "*/*";
    pub const JSON: &str = "application/json";
    pub const HTML: &str = "text/html";
    pub const XML: &str = "application/xml";
    pub const XML2: &str = "text/xml";
    pub const PLAIN: &str = "text/plain";
    pub const URLENCODED: &str = "application/x-www-form-urlencoded";
    pub const MULTIPART: &str = "multipart/form-data";
    pub const PROTOBUF: &str = "application/x-protobuf";
    pub const MSGPACK: &str = "application/x-msgpack";
    pub const MSGPACK2: &str = "application/msgpack";
}

/// Request methods supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    /// Wire spelling of the method.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }

    /// HEAD responses never carry a body, whatever `Content-Length` says.
    pub const fn expects_response_body(&self) -> bool {
        !matches!(self, Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finds the `Content-Length` value regardless of the casing the peer used.
pub fn content_length_header(headers: &Headers) -> Option<&str> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(CONTENT_LENGTH))
        .map(|(_, value)| value.as_str())
}

/// Request body.
///
/// A reader-backed body is drained once; draining replaces the reader with
/// the collected bytes so a retried attempt resends them.
pub enum Body {
    Bytes(Bytes),
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        /// Bytes read so far. Kept when a drain is abandoned mid-way.
        received: Vec<u8>,
    },
}

impl Body {
    /// Wraps a reader that will be drained when the request is sent.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Body::Reader {
            reader: Box::new(reader),
            received: Vec::new(),
        }
    }

    /// Reads the whole body and returns its bytes.
    ///
    /// Cancel safe: dropping the future keeps what was already read, and the
    /// next call continues from there.
    pub async fn drain(&mut self) -> io::Result<Bytes> {
        let bytes = match self {
            Body::Bytes(bytes) => return Ok(bytes.clone()),
            Body::Reader { reader, received } => {
                while reader.read_buf(received).await? != 0 {}
                Bytes::from(std::mem::take(received))
            }
        };
        *self = Body::Bytes(bytes.clone());
        Ok(bytes)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Reader { received, .. } => {
                f.debug_struct("Reader").field("received", &received.len()).finish()
            }
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// Parsed response of one attempt.
///
/// `error` is set exactly when the exchange failed: a status >= 400 or a
/// transport, timeout, cancellation or parse condition.
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// Protocol version from the status line, e.g. `HTTP/1.1`.
    pub version: String,
    /// Numeric status code.
    pub status: u16,
    /// Reason phrase following the status code.
    pub description: String,
    /// Headers as received.
    pub headers: Headers,
    /// Declared `Content-Length`, 0 when absent.
    pub content_length: u64,
    /// Accumulated body.
    pub body: String,
    /// Failure cause, if any.
    pub error: Option<HttpError>,
}

impl Response {
    /// Builds the synthetic response for a failed attempt.
    pub fn failed(error: HttpError) -> Self {
        Response {
            status: STATUS_BAD_REQUEST,
            error: Some(error),
            ..Response::default()
        }
    }

    /// Returns true when the attempt failed or the peer reported a failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status >= STATUS_BAD_REQUEST
    }

    /// Exact-case header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Converts into the `(body, error)` pair callers consume.
    pub fn into_result(self) -> HttpResult<String> {
        if !self.is_failure() {
            return Ok(self.body);
        }
        Err(self.error.unwrap_or(HttpError::RequestFail))
    }
}
