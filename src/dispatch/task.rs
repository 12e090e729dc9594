//! Dispatch task
//!
//! One decoded payload bound to the session it came from.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::handler::EventHandler;
use crate::network::Session;

/// A unit of pooled work
///
/// Counts as pending on its session from creation until it runs or is
/// dropped, so a closing session can wait for it.
pub struct DispatchTask {
    session: Arc<Session>,
    handler: Arc<dyn EventHandler>,
    payload: Bytes,
}

impl DispatchTask {
    pub fn new(session: Arc<Session>, handler: Arc<dyn EventHandler>, payload: Bytes) -> Self {
        session.task_queued();
        Self {
            session,
            handler,
            payload,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Deliver the payload to `on_message`
    ///
    /// Returns false without running if the session already closed.
    pub fn run(mut self) -> bool {
        if !self.session.try_enter_task() {
            tracing::debug!(id = self.session.id(), "Discarding task for closed session");
            return false;
        }
        let payload = std::mem::take(&mut self.payload);
        self.handler.on_message(&self.session, payload);
        true
    }
}

impl Drop for DispatchTask {
    fn drop(&mut self) {
        self.session.task_finished();
    }
}

impl fmt::Debug for DispatchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTask")
            .field("session", &self.session.id())
            .field("len", &self.payload.len())
            .finish()
    }
}
