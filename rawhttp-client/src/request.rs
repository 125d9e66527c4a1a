//! Mutable request state owned by the client's request guard.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rawhttp_common::{
    content_type, encode_request, Body, Headers, HttpError, HttpResult, Method, HTTP_VERSION,
};

use crate::config::ClientConfig;

/// The single active request of a client.
///
/// Reused across calls: `begin` resets the per-call fields and `finish`
/// marks the exchange complete.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub headers: Headers,
    pub body: Option<Body>,
    pub timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Set once the current exchange reached a terminal outcome.
    pub done: bool,
    /// Retries granted so far in the current call.
    pub retry: u16,
}

impl Request {
    /// Creates the request slot with the default headers for `host`.
    pub fn new(host: &str, config: &ClientConfig) -> Self {
        Request {
            method: Method::Get,
            target: "/".to_string(),
            headers: default_headers(host),
            body: None,
            timeout: config.timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            done: false,
            retry: 0,
        }
    }

    /// Starts a new logical call.
    pub fn begin(&mut self, method: Method, target: String, body: Option<Body>) {
        self.method = method;
        self.target = target;
        self.body = body;
        self.done = false;
        self.retry = 0;
    }

    /// Ends the logical call.
    pub fn finish(&mut self) {
        self.done = true;
        self.retry = 0;
        self.body = None;
    }

    /// Drains the body, if any. Bytes read before an abandoned drain are
    /// kept for the next attempt.
    pub async fn payload(&mut self) -> HttpResult<Option<Bytes>> {
        match self.body.as_mut() {
            Some(body) => body
                .drain()
                .await
                .map(Some)
                .map_err(|err| HttpError::Body(Arc::new(err))),
            None => Ok(None),
        }
    }

    /// Serializes the request with an already drained payload.
    pub fn encode(&self, payload: Option<&[u8]>, out: &mut Vec<u8>) {
        encode_request(
            self.method,
            &self.target,
            HTTP_VERSION,
            &self.headers,
            payload,
            out,
        );
    }
}

/// Client identification sent in `User-Agent`.
pub fn user_agent() -> String {
    format!(
        "rawhttp/{} ({}; CPU {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Headers sent unless overridden with `Client::set_header`.
///
/// `Accept-Encoding` is declared only; compressed bodies are not decoded.
pub fn default_headers(host: &str) -> Headers {
    let mut headers = Headers::new();
    headers.insert("Host".to_string(), host.to_string());
    headers.insert("User-Agent".to_string(), user_agent());
    headers.insert("Accept".to_string(), content_type::ANY.to_string());
    headers.insert("Accept-Charset".to_string(), "utf-8".to_string());
    headers.insert("Accept-Language".to_string(), "en".to_string());
    headers.insert("Accept-Encoding".to_string(), "deflate".to_string());
    headers.insert("Cache-Control".to_string(), "no-cache".to_string());
    headers.insert("Connection".to_string(), "keep-alive".to_string());
    headers
}
