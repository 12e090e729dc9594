//! Sleep handler
//!
//! Simulates slow message processing for dispatch-pool benchmarks.

use std::thread;
use std::time::Duration;

use bytes::Bytes;

use super::EventHandler;
use crate::error::{BenchError, Result};
use crate::network::Session;

/// Logs every event and blocks for a fixed time per message
#[derive(Debug, Clone)]
pub struct SleepHandler {
    delay: Duration,
}

impl Default for SleepHandler {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SleepHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl EventHandler for SleepHandler {
    fn on_open(&self, session: &Session) -> Result<()> {
        tracing::info!(session = %session.stat(), "Session opened");
        Ok(())
    }

    fn on_message(&self, session: &Session, payload: Bytes) {
        tracing::info!(id = session.id(), len = payload.len(), "OnMessage: {:?}", payload);
        thread::sleep(self.delay);
    }

    fn on_error(&self, session: &Session, error: &BenchError) {
        tracing::warn!(
            session = %session.stat(),
            "Session got error {}, will be closed",
            error
        );
    }

    fn on_close(&self, session: &Session) {
        tracing::info!(session = %session.stat(), "Session is closing");
    }

    fn on_cron(&self, session: &Session) {
        tracing::debug!(id = session.id(), "OnCron");
    }
}
