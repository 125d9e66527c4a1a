//! # Connection Manager
//!
//! Purpose: Own the client's single transport connection, dialed in the
//! background so construction never blocks.
//!
//! ## Design Principles
//! 1. **One-Shot Readiness**: The dial task publishes its outcome once through
//!    a `watch` channel; checks wait on that signal with a deadline instead of
//!    polling a flag.
//! 2. **Single Use**: After `close` the state is `Closed` for good. A dial that
//!    completes after `close` drops its stream instead of reviving the client.
//! 3. **Sticky Errors**: A failed dial is recorded once and never cleared.
//! 4. **Strategy Pattern**: `Transport` picks how the stream is established.
//!
//! ```text
//! Dialing ──ok──▶ Connected ──close──▶ Closed
//!    │  └──────────close──────────────▶ Closed
//!    └──err──▶ Failed(error)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use rawhttp_common::{HttpError, HttpResult};

/// How the transport connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain TCP.
    Plain,
    /// Encrypted transport. No handshake is implemented; dialing fails with
    /// `HttpError::SecuredTransportUnsupported`.
    Secured,
}

/// Observable dial state.
#[derive(Debug, Clone)]
pub enum DialState {
    Dialing,
    Connected,
    Failed(HttpError),
    Closed,
}

/// Handle to the single connection of a client.
pub struct Connection {
    host: String,
    state: watch::Receiver<DialState>,
    publisher: Arc<watch::Sender<DialState>>,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl Connection {
    /// Spawns the dial task and returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(host: String, transport: Transport, dial_timeout: Duration) -> HttpResult<Self> {
        let runtime = Handle::try_current().map_err(|_| HttpError::NoRuntime)?;
        let (publisher, state) = watch::channel(DialState::Dialing);
        let publisher = Arc::new(publisher);
        let stream = Arc::new(Mutex::new(None));

        runtime.spawn(dial(
            host.clone(),
            transport,
            dial_timeout,
            publisher.clone(),
            stream.clone(),
        ));

        Ok(Connection {
            host,
            state,
            publisher,
            stream,
        })
    }

    /// Remote `host:port`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns true while the connection is established and not closed.
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), DialState::Connected)
    }

    /// Error recorded by the dial task, if it failed.
    pub fn connection_error(&self) -> Option<HttpError> {
        match &*self.state.borrow() {
            DialState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Waits up to `deadline` for the dial to finish.
    ///
    /// **Output**: `Ok(())` once connected; `ConnectingTimeout` if still
    /// dialing at the deadline; the recorded error if the dial failed;
    /// `ConnectionClosed` after `close`.
    pub async fn check(&self, deadline: Duration) -> HttpResult<()> {
        let mut state = self.state.clone();
        let waited = tokio::time::timeout(
            deadline,
            state.wait_for(|s| !matches!(s, DialState::Dialing)),
        )
        .await;

        match waited {
            Err(_) => Err(HttpError::ConnectingTimeout),
            // The sender lives as long as `self`, so this is unreachable in practice.
            Ok(Err(_)) => Err(HttpError::ConnectionClosed),
            Ok(Ok(current)) => match &*current {
                DialState::Connected => Ok(()),
                DialState::Failed(err) => Err(err.clone()),
                DialState::Closed => Err(HttpError::ConnectionClosed),
                DialState::Dialing => Err(HttpError::ConnectingTimeout),
            },
        }
    }

    /// Locks the stream for one exchange. `None` once closed.
    ///
    /// The guard is owned so an exchange task can keep the stream after the
    /// attempt that started it was abandoned; the next exchange waits here
    /// until that task has read its response.
    pub(crate) async fn lock_stream(&self) -> OwnedMutexGuard<Option<TcpStream>> {
        self.stream.clone().lock_owned().await
    }

    /// Releases the connection. Safe to call more than once.
    ///
    /// Checks fail with `ConnectionClosed` right away; the stream itself is
    /// shut down once a background exchange holding it has finished.
    pub async fn close(&self) {
        self.publisher.send_if_modified(|state| {
            if matches!(state, DialState::Dialing | DialState::Connected) {
                *state = DialState::Closed;
                true
            } else {
                false
            }
        });
        let mut slot = self.stream.lock().await;
        if let Some(mut stream) = slot.take() {
            if let Err(err) = stream.shutdown().await {
                debug!(host = %self.host, error = %err, "shutdown failed");
            }
            debug!(host = %self.host, "connection closed");
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(host: &str) -> (Self, Arc<watch::Sender<DialState>>) {
        let (publisher, state) = watch::channel(DialState::Dialing);
        let publisher = Arc::new(publisher);
        let connection = Connection {
            host: host.to_string(),
            state,
            publisher: publisher.clone(),
            stream: Arc::new(Mutex::new(None)),
        };
        (connection, publisher)
    }
}

async fn dial(
    host: String,
    transport: Transport,
    dial_timeout: Duration,
    publisher: Arc<watch::Sender<DialState>>,
    slot: Arc<Mutex<Option<TcpStream>>>,
) {
    debug!(%host, ?transport, "connecting");
    match establish(&host, transport, dial_timeout).await {
        Ok(stream) => {
            let peer = stream.peer_addr().ok();
            // Publish under the slot lock so `close` cannot interleave.
            let mut guard = slot.lock().await;
            let accepted = publisher.send_if_modified(|state| {
                if matches!(state, DialState::Dialing) {
                    *state = DialState::Connected;
                    true
                } else {
                    false
                }
            });
            if accepted {
                *guard = Some(stream);
                debug!(%host, ?peer, "connected");
            } else {
                debug!(%host, "connection released before dial completed");
            }
        }
        Err(err) => {
            warn!(%host, error = %err, "connect failed");
            publisher.send_if_modified(|state| {
                if matches!(state, DialState::Dialing) {
                    *state = DialState::Failed(err);
                    true
                } else {
                    false
                }
            });
        }
    }
}

async fn establish(
    host: &str,
    transport: Transport,
    dial_timeout: Duration,
) -> HttpResult<TcpStream> {
    match transport {
        Transport::Secured => Err(HttpError::SecuredTransportUnsupported),
        Transport::Plain => {
            let stream = match tokio::time::timeout(dial_timeout, TcpStream::connect(host)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return Err(HttpError::Connect(Arc::new(err))),
                Err(_) => return Err(HttpError::ConnectingTimeout),
            };
            // Requests are small; send them without Nagle delay.
            stream
                .set_nodelay(true)
                .map_err(|err| HttpError::Connect(Arc::new(err)))?;
            Ok(stream)
        }
    }
}
