//! # Demo HTTP Server
//!
//! Accept HTTP/1.1 connections, parse requests with the shared codec and
//! answer the three demo routes with a JSON envelope.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rawhttp_common::{
    content_type, encode_response, Headers, ParsedRequest, RequestParser, STATUS_BAD_REQUEST,
};

use crate::metrics::Metrics;

/// Default listen address of the binary.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8888";

/// JSON body of every routed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub msg: String,
    pub data: serde_json::Value,
}

impl Envelope {
    fn success(data: serde_json::Value) -> Self {
        Envelope {
            code: 200,
            msg: "Success!".to_string(),
            data,
        }
    }

    fn not_found() -> Self {
        Envelope {
            code: 404,
            msg: "Request Path Not Found!".to_string(),
            data: serde_json::Value::Null,
        }
    }

    fn bad_request(reason: String) -> Self {
        Envelope {
            code: STATUS_BAD_REQUEST,
            msg: "Bad Request!".to_string(),
            data: serde_json::Value::String(reason),
        }
    }
}

/// Routed response before encoding.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub envelope: Option<Envelope>,
}

impl Reply {
    fn json(envelope: Envelope) -> Self {
        Reply {
            status: envelope.code,
            envelope: Some(envelope),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut headers = Headers::new();
        let body = match &self.envelope {
            Some(envelope) => {
                headers.insert("Content-Type".to_string(), content_type::JSON.to_string());
                serde_json::to_vec(envelope).map_err(io::Error::from)?
            }
            None => Vec::new(),
        };
        encode_response(self.status, reason_phrase(self.status), &headers, &body, out);
        Ok(())
    }
}

/// Handle to a server running on a background task.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub metrics: Arc<Metrics>,
    task: JoinHandle<io::Result<()>>,
}

impl RunningServer {
    /// Base URL for clients, e.g. `http://127.0.0.1:40123`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stops accepting connections.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Binds `addr` and serves on a spawned task.
pub async fn spawn(addr: impl ToSocketAddrs) -> io::Result<RunningServer> {
    let listener = TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let metrics = Arc::new(Metrics::new());
    let task = tokio::spawn(run(listener, metrics.clone()));
    Ok(RunningServer { addr, metrics, task })
}

/// Accept loop. Each connection is served on its own task.
pub async fn run(listener: TcpListener, metrics: Arc<Metrics>) -> io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        metrics.record_connection();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, metrics).await {
                debug!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

/// Serves keep-alive requests on one connection until the peer hangs up,
/// asks to close, or sends something unparsable.
pub async fn handle_connection(stream: TcpStream, metrics: Arc<Metrics>) -> io::Result<()> {
    let mut stream = stream;
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let parser = RequestParser::default();
    let mut out = Vec::with_capacity(512);

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            return Ok(());
        }

        loop {
            match parser.parse(&buffer) {
                Ok(Some((request, consumed))) => {
                    buffer.advance(consumed);
                    let started = Instant::now();
                    metrics.record_request_start();

                    let reply = route(&request);
                    debug!(
                        method = %request.method,
                        target = %request.target,
                        status = reply.status,
                        "request"
                    );
                    if reply.status >= STATUS_BAD_REQUEST {
                        metrics.record_error();
                    }
                    out.clear();
                    reply.encode(&mut out)?;
                    let written = stream.write_all(&out).await;
                    metrics.record_request_end(started.elapsed());
                    written?;

                    if wants_close(&request) {
                        return Ok(());
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "malformed request");
                    metrics.record_error();
                    out.clear();
                    Reply::json(Envelope::bad_request(err.to_string())).encode(&mut out)?;
                    stream.write_all(&out).await?;
                    return Ok(());
                }
            }
        }
    }
}

/// Maps a request to its reply. Unknown paths and wrong methods get 404.
pub fn route(request: &ParsedRequest) -> Reply {
    let path = request.target.split('?').next().unwrap_or_default();
    match (request.method.as_str(), path) {
        ("GET", "/hello") => {
            let data = serde_json::Value::String("World!".to_string());
            Reply::json(Envelope::success(data))
        }
        ("POST", "/json") => {
            let data = String::from_utf8_lossy(&request.body).into_owned();
            Reply::json(Envelope::success(serde_json::Value::String(data)))
        }
        ("HEAD", "/head") => Reply {
            status: 200,
            envelope: None,
        },
        _ => Reply::json(Envelope::not_found()),
    }
}

fn wants_close(request: &ParsedRequest) -> bool {
    request.headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("connection") && value.eq_ignore_ascii_case("close")
    })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    }
}
