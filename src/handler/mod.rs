//! Event Handlers
//!
//! Application callbacks invoked by a session at each lifecycle point.
//!
//! ## Event Order
//! ```text
//! on_open ──► on_message* / on_cron* ──► [on_error] ──► on_close
//! ```
//!
//! `on_error` fires at most once and `on_close` exactly once for every
//! session that reached open. No event starts after `on_close`.

mod echo;
mod sleep;

use bytes::Bytes;

use crate::error::{BenchError, Result};
use crate::network::Session;

pub use echo::EchoHandler;
pub use sleep::SleepHandler;

/// Session lifecycle callbacks
///
/// Handlers are shared between a session's read thread and the dispatch
/// pool's workers, so they must be `Send + Sync`.
pub trait EventHandler: Send + Sync {
    /// Runs once after socket tuning, before the first read.
    /// An error aborts the session before it becomes active.
    fn on_open(&self, session: &Session) -> Result<()>;

    /// Runs once per decoded payload
    fn on_message(&self, session: &Session, payload: Bytes);

    /// Runs at most once, right before the session starts closing
    fn on_error(&self, session: &Session, error: &BenchError);

    /// Runs exactly once, after the connection is torn down
    fn on_close(&self, session: &Session);

    /// Runs every cron period while the session is active
    fn on_cron(&self, session: &Session);
}
