//! # Request Orchestrator
//!
//! Purpose: Expose the client's verbs and drive each call through
//! connection check, send, receive and retry.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides the connection, codec and retry
//!    details behind `get`/`head`/`post`.
//! 2. **One Exchange at a Time**: The request slot sits behind an async mutex
//!    held for the whole call, so concurrent callers queue up.
//! 3. **First Signal Wins**: Each attempt races the exchange against the
//!    request timeout and the caller's cancellation. Socket I/O runs on a
//!    detached task holding the stream, so a lost attempt still reads its own
//!    response before the next exchange may write.
//! 4. **Failures Are Values**: Every attempt ends in a `Response`; errors are
//!    attached to it, classified and possibly retried.
//!
//! ## State Flow
//!
//! ```text
//! Idle ─▶ ConnectingCheck ─▶ Sending ─▶ AwaitingResponse ─▶ Success
//!              │   ▲                           │
//!              │   └────────── Retry ◀─────────┤
//!              └──────────────▶ Failed ◀───────┘
//! ```

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use rawhttp_common::{Body, HttpError, HttpResult, Method, Response, ResponseParser};

use crate::cancel::CancelSignal;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::request::Request;
use crate::retry::RetryPolicy;
use crate::url::{parse_base_url, resolve_target};

/// Initial read buffer capacity; grows up to `max_response_bytes`.
const READ_CHUNK: usize = 1024;

/// HTTP/1.1 client bound to a single connection.
///
/// Construction returns immediately while the connection is dialed in the
/// background. Calls made before the dial finishes wait for it, bounded by the
/// request timeout. After `end` every call fails with `ConnectionClosed`.
pub struct Client {
    config: ClientConfig,
    retry: RetryPolicy,
    connection: Connection,
    request: Mutex<Request>,
    cancel: CancelSignal,
}

impl Client {
    /// Creates a client for `base_url` (`http://host[:port]`).
    pub fn new(base_url: &str, config: ClientConfig) -> HttpResult<Self> {
        Self::with_cancel(base_url, config, CancelSignal::never())
    }

    /// Creates a client whose exchanges abort when `cancel` fires.
    pub fn with_cancel(
        base_url: &str,
        config: ClientConfig,
        cancel: CancelSignal,
    ) -> HttpResult<Self> {
        let (transport, host) = parse_base_url(base_url)?;
        let connection = Connection::open(host.clone(), transport, config.timeout)?;
        let request = Request::new(&host, &config);
        Ok(Client {
            retry: RetryPolicy::new(config.retry),
            config,
            connection,
            request: Mutex::new(request),
            cancel,
        })
    }

    /// Remote `host:port`.
    pub fn host(&self) -> &str {
        self.connection.host()
    }

    /// Returns true while the connection is usable.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Error recorded by a failed dial.
    pub fn connection_error(&self) -> Option<HttpError> {
        self.connection.connection_error()
    }

    /// Sets or replaces a request header for all later calls.
    pub async fn set_header(&self, key: impl Into<String>, value: impl Into<String>) {
        self.request.lock().await.headers.insert(key.into(), value.into());
    }

    /// Sets the overall exchange timeout (also bounds the connection check).
    pub async fn set_timeout(&self, timeout: Duration) {
        self.request.lock().await.timeout = timeout;
    }

    /// Sets the per-read timeout.
    pub async fn set_read_timeout(&self, timeout: Duration) {
        self.request.lock().await.read_timeout = timeout;
    }

    /// Sets the write timeout.
    pub async fn set_write_timeout(&self, timeout: Duration) {
        self.request.lock().await.write_timeout = timeout;
    }

    /// Issues a GET and returns the body.
    pub async fn get(&self, url: &str) -> HttpResult<String> {
        self.send(Method::Get, url, None).await.into_result()
    }

    /// Issues a HEAD.
    pub async fn head(&self, url: &str) -> HttpResult<()> {
        self.send(Method::Head, url, None).await.into_result().map(|_| ())
    }

    /// Issues a POST with `body` and returns the response body.
    pub async fn post(&self, url: &str, body: impl Into<Body>) -> HttpResult<String> {
        self.send(Method::Post, url, Some(body.into())).await.into_result()
    }

    /// Releases the connection. The client cannot be used afterwards.
    pub async fn end(&self) {
        self.connection.close().await;
    }

    /// Runs one logical call and returns the full response.
    ///
    /// A failed call still yields a `Response`, with `error` set; statuses
    /// >= 400 carry `HttpError::RequestFail`.
    pub async fn send(&self, method: Method, url: &str, body: Option<Body>) -> Response {
        let mut request = self.request.lock().await;
        request.begin(method, resolve_target(url), body);
        let response = self.run(&mut request).await;
        request.finish();

        debug!(
            method = %method,
            target = %request.target,
            status = response.status,
            error = ?response.error,
            "call finished"
        );
        response
    }

    async fn run(&self, request: &mut Request) -> Response {
        loop {
            let response = match self.connection.check(request.timeout).await {
                Ok(()) => self.attempt(request).await,
                Err(err) => {
                    if self.retry.permits(request.retry) {
                        request.retry += 1;
                        debug!(
                            method = %request.method,
                            attempt = request.retry,
                            error = %err,
                            "retrying after connection check"
                        );
                        continue;
                    }
                    let err = if self.connection.is_connected() {
                        HttpError::RequestFail
                    } else {
                        err
                    };
                    warn!(host = %self.connection.host(), error = %err, "connection unavailable");
                    return Response::failed(err);
                }
            };

            if self.retry.should_retry(request.retry, &response) {
                request.retry += 1;
                debug!(
                    method = %request.method,
                    attempt = request.retry,
                    status = response.status,
                    error = ?response.error,
                    "retrying"
                );
                continue;
            }
            return classify(response);
        }
    }

    // Races one send/receive cycle against the timeout and the cancel signal.
    async fn attempt(&self, request: &mut Request) -> Response {
        let overall = request.timeout;
        tokio::select! {
            _ = tokio::time::sleep(overall) => Response::failed(HttpError::RequestTimeout),
            _ = self.cancel.cancelled() => Response::failed(HttpError::RequestCanceled),
            result = self.exchange(request) => match result {
                Ok(response) => response,
                Err(err) => Response::failed(err),
            },
        }
    }

    async fn exchange(&self, request: &mut Request) -> HttpResult<Response> {
        let payload = request.payload().await?;
        let mut wire = Vec::with_capacity(512);
        request.encode(payload.as_deref(), &mut wire);
        if self.config.debug {
            debug!(request = %String::from_utf8_lossy(&wire), "sending");
        }

        let stream = self.connection.lock_stream().await;
        let transfer = Transfer {
            wire,
            parser: ResponseParser::new(request.method)
                .with_limit(self.config.max_response_bytes),
            read_timeout: request.read_timeout,
            write_timeout: request.write_timeout,
            debug: self.config.debug,
        };
        // Dropping the handle detaches the task: an abandoned attempt still
        // consumes its response, which is then discarded.
        tokio::spawn(transfer.run(stream))
            .await
            .map_err(|err| HttpError::from(io::Error::new(io::ErrorKind::Other, err)))?
    }
}

/// Socket half of one exchange, run on its own task.
struct Transfer {
    wire: Vec<u8>,
    parser: ResponseParser,
    read_timeout: Duration,
    write_timeout: Duration,
    debug: bool,
}

impl Transfer {
    async fn run(self, mut slot: OwnedMutexGuard<Option<TcpStream>>) -> HttpResult<Response> {
        let stream = slot.as_mut().ok_or(HttpError::ConnectionClosed)?;
        discard_unsolicited(stream)?;

        tokio::time::timeout(self.write_timeout, stream.write_all(&self.wire))
            .await
            .map_err(|_| timed_out("write"))??;

        let mut buffer = BytesMut::with_capacity(READ_CHUNK);
        loop {
            let read = tokio::time::timeout(self.read_timeout, stream.read_buf(&mut buffer))
                .await
                .map_err(|_| timed_out("read"))??;

            let parsed = if read == 0 {
                if buffer.is_empty() {
                    return Err(HttpError::ConnectionClosed);
                }
                self.parser.finish(&buffer)?
            } else {
                match self.parser.parse(&buffer)? {
                    Some(response) => response,
                    None => continue,
                }
            };
            if self.debug {
                debug!(response = %String::from_utf8_lossy(&buffer), "received");
            }
            return Ok(parsed);
        }
    }
}

// Bytes waiting before a request is written belong to no exchange, e.g.
// data sent past a declared Content-Length.
fn discard_unsolicited(stream: &TcpStream) -> HttpResult<()> {
    let mut scratch = [0u8; READ_CHUNK];
    loop {
        match stream.try_read(&mut scratch) {
            Ok(0) => return Err(HttpError::ConnectionClosed),
            Ok(n) => debug!(bytes = n, "discarding unsolicited bytes"),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

// A status >= 400 without an attached error still fails the call.
fn classify(mut response: Response) -> Response {
    if response.is_failure() && response.error.is_none() {
        response.error = Some(HttpError::RequestFail);
    }
    response
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{op} timed out"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::net::TcpListener;
    use tokio::sync::watch;

    use crate::cancel::cancellation;
    use crate::connection::DialState;

    fn detached_client(config: ClientConfig) -> (Client, Arc<watch::Sender<DialState>>) {
        let (connection, publisher) = Connection::detached("10.0.0.1:80");
        let request = Request::new(connection.host(), &config);
        let client = Client {
            retry: RetryPolicy::new(config.retry),
            config,
            connection,
            request: Mutex::new(request),
            cancel: CancelSignal::never(),
        };
        (client, publisher)
    }

    #[test]
    fn classify_marks_error_statuses() {
        let response = classify(Response {
            status: 503,
            ..Response::default()
        });
        assert!(matches!(response.error, Some(HttpError::RequestFail)));

        let response = classify(Response {
            status: 200,
            ..Response::default()
        });
        assert!(response.error.is_none());
    }

    #[test]
    fn classify_keeps_existing_error() {
        let response = classify(Response::failed(HttpError::RequestTimeout));
        assert!(matches!(response.error, Some(HttpError::RequestTimeout)));
    }

    #[tokio::test]
    async fn rejects_bad_base_url() {
        let result = Client::new("localhost:80", ClientConfig::default());
        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn stalled_dial_is_checked_once_per_attempt() {
        let timeout = Duration::from_millis(50);
        let (client, _publisher) = detached_client(ClientConfig {
            retry: 2,
            timeout,
            ..ClientConfig::default()
        });

        let started = Instant::now();
        let mut request = client.request.lock().await;
        request.begin(Method::Get, "/".to_string(), None);
        let response = client.run(&mut request).await;

        assert!(matches!(response.error, Some(HttpError::ConnectingTimeout)));
        // Two granted retries: three checks, each waiting the full deadline.
        assert_eq!(request.retry, 2);
        assert!(started.elapsed() >= timeout * 3);
    }

    #[tokio::test]
    async fn failed_dial_uses_every_retry() {
        let (client, publisher) = detached_client(ClientConfig {
            retry: 3,
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        });
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        publisher.send_replace(DialState::Failed(HttpError::Connect(Arc::new(refused))));

        let mut request = client.request.lock().await;
        request.begin(Method::Get, "/".to_string(), None);
        let response = client.run(&mut request).await;

        assert!(matches!(response.error, Some(HttpError::Connect(_))));
        assert_eq!(request.retry, 3);
    }

    #[tokio::test]
    async fn cancelled_call_keeps_retry_counter_at_zero() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _peer = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let (canceller, signal) = cancellation();
        canceller.cancel();
        let config = ClientConfig {
            retry: 3,
            timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        };
        let client = Client::with_cancel(&format!("http://{addr}"), config, signal).unwrap();

        let mut request = client.request.lock().await;
        request.begin(Method::Get, "/".to_string(), None);
        let response = client.run(&mut request).await;

        assert!(matches!(response.error, Some(HttpError::RequestCanceled)));
        assert_eq!(request.retry, 0);
    }
}
