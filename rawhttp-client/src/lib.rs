//! # rawhttp Client
//!
//! Purpose: Provide a small asynchronous HTTP/1.1 client that speaks the wire
//! format directly over one TCP connection per client.
//!
//! ## Design Principles
//! 1. **Non-Blocking Construction**: The connection is dialed in the background;
//!    calls wait for it only as long as their timeout allows.
//! 2. **Serialized Exchanges**: One request is in flight per client at a time.
//! 3. **Bounded Retries**: Failed attempts and error statuses are repeated up to
//!    a fixed limit; cancellation always ends the call.
//! 4. **Protocol Clarity**: Requests and responses are framed explicitly by the
//!    shared codec in `rawhttp-common`.

pub mod cancel;
mod client;
pub mod config;
pub mod connection;
pub mod request;
pub mod retry;
pub mod url;

pub use cancel::{cancellation, CancelSignal, Canceller};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use connection::{DialState, Transport};
pub use request::{default_headers, user_agent};
pub use retry::RetryPolicy;
pub use url::{parse_base_url, resolve_target};

pub use rawhttp_common::{
    content_type, Body, Headers, HttpError, HttpResult, Method, ParseError, Response,
};
