//! # framebench
//!
//! A TCP server harness for benchmarking a length-prefixed
//! request/response protocol:
//! - 4-byte little-endian length-prefixed framing of opaque payloads
//! - One thread per connection driving a session lifecycle
//!   (open, message, error, close, periodic cron)
//! - Optional bounded task pool decoupling I/O from message handling
//! - Coordinated shutdown with a per-session grace period
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │               (acceptor, session registry)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one thread per connection
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Connection / Session                        │
//! │        ReceiveBuffer ─► FrameCodec ─► payloads              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │ inline                  │ pooled
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │EventHandler │◄─────────│  TaskPool   │
//!   │ on_message  │          │  (workers)  │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod handler;
pub mod dispatch;
pub mod network;
pub mod diagnostics;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BenchError, Result};
pub use config::{ServerConfig, SessionConfig};
pub use handler::EventHandler;
pub use network::{Server, Session};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of framebench
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
