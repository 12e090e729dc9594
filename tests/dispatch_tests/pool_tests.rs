//! Task Pool Tests
//!
//! These tests verify:
//! - Pooled execution and statistics
//! - Per-session FIFO ordering with worker affinity
//! - Overflow policies (block and reject)
//! - Shutdown draining and discarding

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel;

use framebench::config::{OverflowPolicy, PoolConfig, TaskOrdering};
use framebench::dispatch::{DispatchTask, Dispatcher, TaskPool};
use framebench::handler::EventHandler;
use framebench::BenchError;

use common::{closed_session, spawn_connection, test_session_config, wait_for, Event, RecordingHandler};

// =============================================================================
// Helper Functions
// =============================================================================

fn pool(size: usize, queue_capacity: usize, overflow: OverflowPolicy, ordering: TaskOrdering) -> TaskPool {
    TaskPool::new(PoolConfig {
        size,
        queue_capacity,
        overflow,
        ordering,
    })
    .unwrap()
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// =============================================================================
// Execution
// =============================================================================

#[test]
fn test_pool_executes_tasks() {
    let (handler, rx) = RecordingHandler::new();
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = pool(4, 32, OverflowPolicy::Block, TaskOrdering::Unordered);
    let dyn_handler: Arc<dyn EventHandler> = handler.clone();

    for i in 0..20u8 {
        let task = DispatchTask::new(Arc::clone(&session), Arc::clone(&dyn_handler), Bytes::from(vec![i]));
        pool.submit(task).unwrap();
    }

    for _ in 0..20 {
        assert!(wait_for(&rx, Duration::from_secs(5), |e| matches!(e, Event::Message(..))).is_some());
    }

    pool.shutdown();
    assert_eq!(handler.messages(session.id()).len(), 20);
    assert_eq!(pool.queued(), 0);
    assert_eq!(session.pending_tasks(), 0);

    drop(client);
    conn.join().unwrap();
}

#[test]
fn test_per_session_ordering() {
    let (handler, _rx) = RecordingHandler::new();
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = pool(4, 256, OverflowPolicy::Block, TaskOrdering::PerSession);
    let dyn_handler: Arc<dyn EventHandler> = handler.clone();

    for i in 0..50u8 {
        let task = DispatchTask::new(Arc::clone(&session), Arc::clone(&dyn_handler), Bytes::from(vec![i]));
        pool.submit(task).unwrap();
    }
    pool.shutdown();

    let expected: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i]).collect();
    assert_eq!(handler.messages(session.id()), expected);

    drop(client);
    conn.join().unwrap();
}

#[test]
fn test_pending_tasks_tracked() {
    let (gate_tx, gate_rx) = channel::unbounded();
    let (handler, rx) = RecordingHandler::gated(gate_rx);
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = pool(1, 4, OverflowPolicy::Block, TaskOrdering::Unordered);

    pool.submit(DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::from_static(b"x")))
        .unwrap();
    assert_eq!(session.pending_tasks(), 1);

    gate_tx.send(()).unwrap();
    assert!(wait_for(&rx, Duration::from_secs(5), |e| matches!(e, Event::Message(..))).is_some());
    assert!(wait_until(Duration::from_secs(2), || session.pending_tasks() == 0));

    pool.shutdown();
    drop(client);
    conn.join().unwrap();
}

// =============================================================================
// Overflow Policies
// =============================================================================

#[test]
fn test_reject_when_saturated() {
    let (gate_tx, gate_rx) = channel::unbounded();
    let (handler, _rx) = RecordingHandler::gated(gate_rx);
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = pool(1, 1, OverflowPolicy::Reject, TaskOrdering::Unordered);

    let task = |b: &'static [u8]| DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::from_static(b));

    // First task occupies the only worker
    pool.submit(task(b"1")).unwrap();
    assert!(wait_until(Duration::from_secs(2), || pool.queued() == 0));

    // Second fills the queue, third overflows
    pool.submit(task(b"2")).unwrap();
    match pool.submit(task(b"3")) {
        Err(BenchError::Overloaded { capacity }) => assert_eq!(capacity, 1),
        other => panic!("Expected Overloaded, got {:?}", other),
    }

    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    pool.shutdown();

    assert_eq!(handler.messages(session.id()), vec![b"1".to_vec(), b"2".to_vec()]);
    assert_eq!(session.pending_tasks(), 0);

    drop(client);
    conn.join().unwrap();
}

#[test]
fn test_block_when_saturated() {
    let (gate_tx, gate_rx) = channel::unbounded();
    let (handler, _rx) = RecordingHandler::gated(gate_rx);
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = Arc::new(pool(1, 1, OverflowPolicy::Block, TaskOrdering::Unordered));

    pool.submit(DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::from_static(b"1")))
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || pool.queued() == 0));
    pool.submit(DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::from_static(b"2")))
        .unwrap();

    let blocked = {
        let pool = Arc::clone(&pool);
        let session = Arc::clone(&session);
        let handler = handler.clone();
        thread::spawn(move || pool.submit(DispatchTask::new(session, handler, Bytes::from_static(b"3"))))
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!blocked.is_finished(), "Submit should block while the queue is full");

    for _ in 0..3 {
        gate_tx.send(()).unwrap();
    }
    assert!(blocked.join().unwrap().is_ok());

    pool.shutdown();
    assert_eq!(handler.messages(session.id()).len(), 3);
    assert_eq!(pool.queued(), 0);

    drop(client);
    conn.join().unwrap();
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_tasks_for_closed_session_discarded() {
    let (handler, _rx) = RecordingHandler::new();
    let session = closed_session(handler.clone());
    let pool = pool(2, 8, OverflowPolicy::Block, TaskOrdering::Unordered);

    pool.submit(DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::from_static(b"late")))
        .unwrap();
    pool.shutdown();

    assert!(handler.messages(session.id()).is_empty());
    assert_eq!(session.pending_tasks(), 0);
}

#[test]
fn test_shutdown_drains_queue() {
    let (handler, _rx) = RecordingHandler::slow(Duration::from_millis(10));
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = pool(1, 16, OverflowPolicy::Block, TaskOrdering::Unordered);

    for _ in 0..10 {
        pool.submit(DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::from_static(b"q")))
            .unwrap();
    }
    pool.shutdown();

    assert!(pool.is_shutdown());
    assert_eq!(handler.messages(session.id()).len(), 10);
    assert_eq!(pool.queued(), 0);

    drop(client);
    conn.join().unwrap();
}

#[test]
fn test_submit_after_shutdown() {
    let (handler, _rx) = RecordingHandler::new();
    let (client, session, conn) =
        spawn_connection(handler.clone(), test_session_config(), Dispatcher::Inline);
    let pool = pool(1, 1, OverflowPolicy::Block, TaskOrdering::Unordered);

    pool.shutdown();
    pool.shutdown();

    let result = pool.submit(DispatchTask::new(Arc::clone(&session), handler.clone(), Bytes::new()));
    assert!(matches!(result, Err(BenchError::PoolClosed)));
    assert_eq!(session.pending_tasks(), 0);

    drop(client);
    conn.join().unwrap();
}

#[test]
fn test_invalid_pool_config() {
    let result = TaskPool::new(PoolConfig {
        size: 0,
        ..PoolConfig::default()
    });
    assert!(matches!(result, Err(BenchError::Config(_))));
}
