use std::time::Duration;

use rawhttp_common::DEFAULT_MAX_MESSAGE_BYTES;

/// Default for the overall, read and write timeouts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a client and its single connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Additional attempts after a failed one. 0 disables retries.
    pub retry: u16,
    /// Log full request and response text.
    pub debug: bool,
    /// Deadline for the dial, the connection check and a whole exchange.
    pub timeout: Duration,
    /// Deadline for each socket read.
    pub read_timeout: Duration,
    /// Deadline for writing a request.
    pub write_timeout: Duration,
    /// Largest response the client will buffer.
    pub max_response_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            retry: 0,
            debug: false,
            timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}
