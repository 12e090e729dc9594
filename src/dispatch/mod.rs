//! Dispatch Module
//!
//! Decides where `on_message` runs.
//!
//! ## Modes
//! - Inline: on the session's own read thread, in decode order
//! - Pooled: on a shared `TaskPool`; per-session order only holds with
//!   `TaskOrdering::PerSession`
//!
//! A saturated pool blocks the submitting session by default
//! (`OverflowPolicy::Block`); `OverflowPolicy::Reject` fails the session
//! with `Overloaded` instead.

mod pool;
mod task;

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::handler::EventHandler;
use crate::network::Session;

pub use pool::TaskPool;
pub use task::DispatchTask;

/// Where a session delivers decoded payloads
#[derive(Clone, Default)]
pub enum Dispatcher {
    #[default]
    Inline,
    Pooled(Arc<TaskPool>),
}

impl Dispatcher {
    pub fn pooled(pool: Arc<TaskPool>) -> Self {
        Dispatcher::Pooled(pool)
    }

    /// Hand one payload to the handler, inline or through the pool
    pub fn dispatch(
        &self,
        session: &Arc<Session>,
        handler: &Arc<dyn EventHandler>,
        payload: Bytes,
    ) -> Result<()> {
        match self {
            Dispatcher::Inline => {
                handler.on_message(session, payload);
                Ok(())
            }
            Dispatcher::Pooled(pool) => pool.submit(DispatchTask::new(
                Arc::clone(session),
                Arc::clone(handler),
                payload,
            )),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatcher::Inline => f.write_str("Inline"),
            Dispatcher::Pooled(pool) => write!(f, "Pooled({} workers)", pool.config().size),
        }
    }
}
