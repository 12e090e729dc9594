//! Task pool
//!
//! Fixed set of worker threads fed through bounded crossbeam channels.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};

use super::DispatchTask;
use crate::config::{OverflowPolicy, PoolConfig, TaskOrdering};
use crate::diagnostics::{
    POOL_TASKS_DISCARDED_TOTAL, POOL_TASKS_EXECUTED_TOTAL, POOL_TASKS_QUEUED, POOL_TASKS_REJECTED_TOTAL,
    POOL_TASKS_SUBMITTED_TOTAL,
};
use crate::error::{BenchError, Result};

/// Bounded worker pool shared by all sessions
pub struct TaskPool {
    config: PoolConfig,

    /// One queue (unordered) or one per worker (per-session); `None` once
    /// shut down
    queues: RwLock<Option<Vec<Sender<DispatchTask>>>>,

    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    /// Validate the config and start the workers
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let mut queues = Vec::new();
        let mut workers = Vec::with_capacity(config.size);

        match config.ordering {
            TaskOrdering::Unordered => {
                let (tx, rx) = channel::bounded(config.queue_capacity);
                queues.push(tx);
                for worker_id in 0..config.size {
                    workers.push(spawn_worker(worker_id, rx.clone())?);
                }
            }
            TaskOrdering::PerSession => {
                let per_worker = (config.queue_capacity / config.size).max(1);
                for worker_id in 0..config.size {
                    let (tx, rx) = channel::bounded(per_worker);
                    queues.push(tx);
                    workers.push(spawn_worker(worker_id, rx)?);
                }
            }
        }

        tracing::info!(
            workers = config.size,
            queue_capacity = config.queue_capacity,
            overflow = ?config.overflow,
            ordering = ?config.ordering,
            "Task pool started"
        );

        Ok(Self {
            config,
            queues: RwLock::new(Some(queues)),
            workers: Mutex::new(workers),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Queue a task according to the overflow policy
    ///
    /// `Block` waits for queue space; `Reject` fails with `Overloaded`.
    pub fn submit(&self, task: DispatchTask) -> Result<()> {
        let queues = self.queues.read();
        let queues = queues.as_ref().ok_or(BenchError::PoolClosed)?;

        let index = match self.config.ordering {
            TaskOrdering::Unordered => 0,
            TaskOrdering::PerSession => (task.session().id() % queues.len() as u64) as usize,
        };
        let queue = &queues[index];

        // Raised before the send; the worker lowers it on receipt
        let queued = gauge!(POOL_TASKS_QUEUED);
        queued.increment(1.0);

        let sent = match self.config.overflow {
            OverflowPolicy::Block => queue.send(task).map_err(|_| BenchError::PoolClosed),
            OverflowPolicy::Reject => queue.try_send(task).map_err(|e| match e {
                TrySendError::Full(_) => {
                    counter!(POOL_TASKS_REJECTED_TOTAL).increment(1);
                    BenchError::Overloaded {
                        capacity: queue.capacity().unwrap_or(self.config.queue_capacity),
                    }
                }
                TrySendError::Disconnected(_) => BenchError::PoolClosed,
            }),
        };

        match sent {
            Ok(()) => {
                counter!(POOL_TASKS_SUBMITTED_TOTAL).increment(1);
                Ok(())
            }
            Err(e) => {
                queued.decrement(1.0);
                Err(e)
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.queues.read().is_none()
    }

    /// Tasks currently waiting in the queues
    pub fn queued(&self) -> usize {
        self.queues
            .read()
            .as_ref()
            .map(|queues| queues.iter().map(Sender::len).sum())
            .unwrap_or(0)
    }

    /// Stop accepting tasks, drain the queues and join every worker
    ///
    /// Queued tasks of closed sessions are discarded without running.
    /// Idempotent.
    pub fn shutdown(&self) {
        let queues = self.queues.write().take();
        if queues.is_none() {
            return;
        }
        drop(queues);

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::warn!("Dispatch worker panicked during shutdown");
            }
        }

        tracing::info!(workers = self.config.size, "Task pool stopped");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(worker_id: usize, queue: Receiver<DispatchTask>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("dispatch-worker-{worker_id}"))
        .spawn(move || worker_loop(worker_id, queue))?;
    Ok(handle)
}

/// Runs until every sender is gone and the queue is empty
fn worker_loop(worker_id: usize, queue: Receiver<DispatchTask>) {
    for task in queue.iter() {
        gauge!(POOL_TASKS_QUEUED).decrement(1.0);
        let session = task.session().id();
        match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(true) => {
                counter!(POOL_TASKS_EXECUTED_TOTAL).increment(1);
            }
            Ok(false) => {
                counter!(POOL_TASKS_DISCARDED_TOTAL).increment(1);
                tracing::trace!(worker = worker_id, session, "Discarded task of closed session");
            }
            Err(_) => {
                counter!(POOL_TASKS_EXECUTED_TOTAL).increment(1);
                tracing::error!(worker = worker_id, session, "Message handler panicked");
            }
        }
    }
}
