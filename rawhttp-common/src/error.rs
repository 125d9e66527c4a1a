//! # Error Taxonomy
//!
//! Purpose: One error type shared by the codec, the client and the demo
//! server, so a failed exchange can carry its cause inside a `Response`.
//!
//! ## Design Principles
//! 1. **Clone-able Errors**: A dial failure is recorded once and handed to
//!    every later connection check, so I/O errors are wrapped in `Arc`.
//! 2. **Parse Errors Stay Specific**: Codec failures keep the conversion error
//!    that triggered them.
//! 3. **No Panics**: Every failure path produces a value, never a crash.

use std::io;
use std::num::ParseIntError;
use std::sync::Arc;

use thiserror::Error;

/// Result type used across the workspace.
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors surfaced by a request exchange.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// The dial did not complete within the request deadline.
    #[error("connecting timeout")]
    ConnectingTimeout,

    /// The peer answered with status >= 400, or the call failed after the
    /// connection was established.
    #[error("request fail")]
    RequestFail,

    /// The caller cancelled the request. Never retried.
    #[error("the request was canceled proactively")]
    RequestCanceled,

    /// No response arrived within the request timeout.
    #[error("the request timed out waiting for a response")]
    RequestTimeout,

    /// The response (or request, on the server side) was malformed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Transport failure while reading or writing.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// The request body reader failed. The reader may be half consumed, so
    /// the attempt is never repeated.
    #[error("request body error: {0}")]
    Body(Arc<io::Error>),

    /// The dial task failed to establish the connection.
    #[error("connect error: {0}")]
    Connect(Arc<io::Error>),

    /// The connection was released with `end` or closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Base URL could not be understood.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The secured transport has no handshake implementation.
    #[error("secured transport is not supported")]
    SecuredTransportUnsupported,

    /// The client was constructed outside of a Tokio runtime.
    #[error("no async runtime available to dial")]
    NoRuntime,
}

impl HttpError {
    /// Returns true for outcomes a retry cannot change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HttpError::RequestCanceled | HttpError::Body(_))
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        HttpError::Io(Arc::new(err))
    }
}

/// Wire format violations found by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Status line did not have a version and a status field.
    #[error("malformed status line")]
    InvalidStatusLine,

    /// Status field was not a number.
    #[error("invalid status code: {0}")]
    InvalidStatus(ParseIntError),

    /// `Content-Length` was not a non-negative integer.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(ParseIntError),

    /// The accumulated message grew past the configured ceiling.
    #[error("message exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// End of stream before the head was complete.
    #[error("incomplete message")]
    Incomplete,

    /// Request line did not have method, target and version.
    #[error("malformed request line")]
    InvalidRequestLine,
}
