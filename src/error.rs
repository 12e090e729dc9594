//! Error types for framebench
//!
//! Provides a unified error type for codec, session and pool operations.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using BenchError
pub type Result<T> = std::result::Result<T, BenchError>;

/// Direction of a timed-out socket operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOp::Read => f.write_str("read"),
            IoOp::Write => f.write_str("write"),
        }
    }
}

/// Unified error type for framebench operations
///
/// Cloneable so a session-fatal error can be handed back to the caller that
/// hit it and still be reported once through `EventHandler::on_error`.
#[derive(Debug, Clone, Error)]
pub enum BenchError {
    // -------------------------------------------------------------------------
    // Startup I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    // -------------------------------------------------------------------------
    // Framing Errors
    // -------------------------------------------------------------------------
    #[error("Oversized frame: declared length {len} exceeds maximum {max}")]
    OversizedFrame { len: usize, max: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("{op} timed out after {timeout:?}")]
    IoTimeout { op: IoOp, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(Arc<io::Error>),

    #[error("Session closed")]
    SessionClosed,

    #[error("Session not active yet (state {state})")]
    SessionNotActive { state: String },

    #[error("Handler error: {0}")]
    Handler(String),

    // -------------------------------------------------------------------------
    // Dispatch Errors
    // -------------------------------------------------------------------------
    #[error("Dispatch pool overloaded: queue capacity {capacity} exhausted")]
    Overloaded { capacity: usize },

    #[error("Dispatch pool is shut down")]
    PoolClosed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<io::Error> for BenchError {
    fn from(err: io::Error) -> Self {
        BenchError::Io(Arc::new(err))
    }
}

impl BenchError {
    /// Classify a socket error raised during a session read or write.
    ///
    /// Timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows.
    pub fn from_socket(err: io::Error, op: IoOp, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                BenchError::IoTimeout { op, timeout }
            }
            _ => BenchError::Transport(Arc::new(err)),
        }
    }
}
