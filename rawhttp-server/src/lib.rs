//! # rawhttp Demo Server
//!
//! Purpose: A small HTTP/1.1 peer serving `/hello`, `/json` and `/head`, used
//! to exercise the client end to end.
//!
//! ## Design Principles
//! 1. **Shared Codec**: Requests are parsed and responses framed by
//!    `rawhttp-common`, the same code the client relies on.
//! 2. **Task per Connection**: Each accepted socket runs on its own task.
//! 3. **Observable**: Atomic metrics count requests, errors and latency.

pub mod metrics;
pub mod server;

pub use metrics::{LatencySnapshot, Metrics, MetricsSnapshot};
pub use server::{
    handle_connection, route, run, spawn, Envelope, Reply, RunningServer, DEFAULT_ADDR,
};
