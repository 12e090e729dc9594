//! Echo handler
//!
//! Writes every payload back to the peer unchanged.

use std::time::Duration;

use bytes::Bytes;

use super::EventHandler;
use crate::error::{BenchError, Result};
use crate::network::Session;

/// Echoes payloads and closes sessions that stay idle too long
#[derive(Debug, Clone, Default)]
pub struct EchoHandler {
    /// Close the session from `on_cron` once idle this long
    idle_limit: Option<Duration>,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_limit(mut self, limit: Duration) -> Self {
        self.idle_limit = Some(limit);
        self
    }
}

impl EventHandler for EchoHandler {
    fn on_open(&self, session: &Session) -> Result<()> {
        tracing::info!(session = %session.stat(), "Session opened");
        Ok(())
    }

    fn on_message(&self, session: &Session, payload: Bytes) {
        tracing::trace!(id = session.id(), len = payload.len(), "Echoing payload");
        match session.write_pkg(&payload) {
            Ok(_) => {}
            Err(BenchError::MalformedPayload(reason)) => {
                tracing::warn!(id = session.id(), "Dropped echo: {}", reason);
            }
            Err(e) => {
                tracing::debug!(id = session.id(), "Echo failed: {}", e);
            }
        }
    }

    fn on_error(&self, session: &Session, error: &BenchError) {
        tracing::warn!(
            session = %session.stat(),
            "Session got error {}, will be closed",
            error
        );
    }

    fn on_close(&self, session: &Session) {
        tracing::info!(session = %session.stat(), "Session closed");
    }

    fn on_cron(&self, session: &Session) {
        if let Some(limit) = self.idle_limit {
            let idle = session.idle_for();
            if idle > limit {
                tracing::info!(
                    id = session.id(),
                    idle_ms = idle.as_millis() as u64,
                    "Closing idle session"
                );
                session.close();
            }
        }
    }
}
