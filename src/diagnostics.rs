//! Diagnostics
//!
//! Prometheus recorder, metric names and a background HTTP listener that
//! answers every request with the rendered exposition text. Meant for
//! watching a benchmark run live; it takes no part in the session protocol.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{BenchError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

// Metric names

/// Build info (gauge, labels: version), always 1
pub const BUILD_INFO: &str = "framebench_build_info";
/// Connections accepted by the listener (counter)
pub const SESSIONS_ACCEPTED_TOTAL: &str = "framebench_sessions_accepted_total";
/// Connections dropped by the factory or session setup (counter)
pub const SESSIONS_REJECTED_TOTAL: &str = "framebench_sessions_rejected_total";
/// Sessions whose lifecycle completed (counter)
pub const SESSIONS_CLOSED_TOTAL: &str = "framebench_sessions_closed_total";
/// Sessions currently running (gauge)
pub const SESSIONS_ACTIVE: &str = "framebench_sessions_active";
/// Tasks accepted by the dispatch pool (counter)
pub const POOL_TASKS_SUBMITTED_TOTAL: &str = "framebench_pool_tasks_submitted_total";
/// Tasks that ran `on_message` (counter)
pub const POOL_TASKS_EXECUTED_TOTAL: &str = "framebench_pool_tasks_executed_total";
/// Tasks dropped because their session had closed (counter)
pub const POOL_TASKS_DISCARDED_TOTAL: &str = "framebench_pool_tasks_discarded_total";
/// Submissions refused by a full queue (counter)
pub const POOL_TASKS_REJECTED_TOTAL: &str = "framebench_pool_tasks_rejected_total";
/// Tasks waiting in the pool queues (gauge)
pub const POOL_TASKS_QUEUED: &str = "framebench_pool_tasks_queued";

/// Install the global Prometheus recorder
///
/// Call once at startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| BenchError::Metrics(e.to_string()))?;
    metrics::gauge!(BUILD_INFO, "version" => crate::VERSION).set(1.0);
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Bind `addr` and serve the rendered metrics from a background thread
///
/// Bind failure is returned to the caller; per-request failures are only
/// logged.
pub fn spawn(addr: &str, handle: PrometheusHandle) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr)?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "Diagnostics endpoint listening");

    let thread = thread::Builder::new()
        .name("diagnostics".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Err(e) = respond(stream, &handle) {
                            tracing::debug!("Diagnostics request failed: {}", e);
                        }
                    }
                    Err(e) => tracing::debug!("Diagnostics accept failed: {}", e),
                }
            }
        })?;

    Ok(thread)
}

fn respond(stream: TcpStream, handle: &PrometheusHandle) -> std::io::Result<()> {
    stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;
    stream.set_write_timeout(Some(REQUEST_TIMEOUT))?;

    // Drain the request head; its content does not matter.
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let body = handle.render();
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )?;
    stream.flush()
}
