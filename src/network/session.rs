//! Session handle
//!
//! The shared view of one accepted connection. Handlers and pool workers
//! write responses through it; the owning `Connection` drives its
//! lifecycle.

use std::fmt;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::SessionConfig;
use crate::error::{BenchError, IoOp, Result};
use crate::protocol::FrameCodec;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Session lifecycle states
///
/// ```text
/// Created ─► Open ─► Active ─► Closing ─► Closed
///              │        │         ▲
///              └────────┴► Error ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Open,
    Active,
    Error,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Open => "open",
            SessionState::Active => "active",
            SessionState::Error => "error",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State, the first session-fatal error and the number of dispatched
/// payloads not yet finished
#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    fatal: Option<BenchError>,
    pending: usize,
}

/// Traffic counters
#[derive(Debug, Default)]
struct SessionStats {
    packets_read: AtomicU64,
    bytes_read: AtomicU64,
    packets_written: AtomicU64,
    bytes_written: AtomicU64,
}

/// One connection's shared state
pub struct Session {
    id: u64,
    config: SessionConfig,
    codec: FrameCodec,

    /// Control handle used for shutdown
    stream: TcpStream,

    /// Write half; one frame at a time
    writer: Mutex<TcpStream>,

    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,

    lifecycle: Mutex<Lifecycle>,
    drained: Condvar,

    close_requested: AtomicBool,

    stats: SessionStats,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last read or write
    last_active_ms: AtomicU64,
}

impl Session {
    pub(crate) fn new(stream: TcpStream, config: SessionConfig) -> Result<Self> {
        let writer = stream.try_clone()?;
        let peer_addr = stream.peer_addr().ok();
        let local_addr = stream.local_addr().ok();

        Ok(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            codec: FrameCodec::new(config.max_msg_len),
            config,
            stream,
            writer: Mutex::new(writer),
            peer_addr,
            local_addr,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Created,
                fatal: None,
                pending: 0,
            }),
            drained: Condvar::new(),
            close_requested: AtomicBool::new(false),
            stats: SessionStats::default(),
            created_at: Instant::now(),
            last_active_ms: AtomicU64::new(0),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Process-unique session id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> FrameCodec {
        self.codec
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Number of pooled payloads queued or running
    pub fn pending_tasks(&self) -> usize {
        self.lifecycle.lock().pending
    }

    /// Time since the last byte was read or written
    pub fn idle_for(&self) -> Duration {
        self.created_at
            .elapsed()
            .saturating_sub(Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed)))
    }

    pub fn last_active(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed))
    }

    pub fn packets_read(&self) -> u64 {
        self.stats.packets_read.load(Ordering::Relaxed)
    }

    pub fn packets_written(&self) -> u64 {
        self.stats.packets_written.load(Ordering::Relaxed)
    }

    /// One-line summary for logs
    pub fn stat(&self) -> String {
        let addr = |a: Option<SocketAddr>| a.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string());
        format!(
            "session {{{}}}, id {}, local {}, remote {}, state {}, read {} pkgs / {} bytes, wrote {} pkgs / {} bytes",
            self.config.name,
            self.id,
            addr(self.local_addr),
            addr(self.peer_addr),
            self.state(),
            self.stats.packets_read.load(Ordering::Relaxed),
            self.stats.bytes_read.load(Ordering::Relaxed),
            self.stats.packets_written.load(Ordering::Relaxed),
            self.stats.bytes_written.load(Ordering::Relaxed),
        )
    }

    // -------------------------------------------------------------------------
    // Handler-facing operations
    // -------------------------------------------------------------------------

    /// Frame and send one payload
    ///
    /// Only an active or closing session accepts writes; before `on_open`
    /// returns this fails with `SessionNotActive`. A payload the codec
    /// refuses fails with `MalformedPayload` and leaves the session open.
    /// A timeout or transport failure is fatal: it is recorded for
    /// `on_error` and the connection is torn down.
    pub fn write_pkg(&self, payload: &[u8]) -> Result<usize> {
        match self.state() {
            SessionState::Active | SessionState::Closing => {}
            SessionState::Error | SessionState::Closed => return Err(BenchError::SessionClosed),
            state @ (SessionState::Created | SessionState::Open) => {
                return Err(BenchError::SessionNotActive { state: state.to_string() })
            }
        }

        let frame = match self.codec.encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(id = self.id, "Write aborted: {}", e);
                return Err(e);
            }
        };

        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_all(&frame) {
            let err = BenchError::from_socket(e, IoOp::Write, self.config.write_timeout);
            drop(writer);
            self.fail(err.clone());
            return Err(err);
        }
        drop(writer);

        self.stats.packets_written.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_written
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        self.touch();
        Ok(frame.len())
    }

    /// Request a graceful local close
    ///
    /// Reading stops at once; queued work gets the configured wait time
    /// before the connection is torn down. Never reported through
    /// `on_error`.
    pub fn close(&self) {
        if self.close_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(id = self.id, "Close requested");
        let _ = self.stream.shutdown(Shutdown::Read);
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Lifecycle (driven by Connection and the dispatch pool)
    // -------------------------------------------------------------------------

    pub(crate) fn set_state(&self, state: SessionState) {
        let mut lifecycle = self.lifecycle.lock();
        tracing::trace!(id = self.id, from = %lifecycle.state, to = %state, "State change");
        lifecycle.state = state;
    }

    /// Record a session-fatal error and unblock the reader
    ///
    /// Only the first error is kept. Once `begin_closing` has run, errors
    /// are logged instead; the check and the store share the lifecycle
    /// lock with it.
    pub(crate) fn fail(&self, err: BenchError) {
        let mut lifecycle = self.lifecycle.lock();
        let state = lifecycle.state;
        match state {
            SessionState::Error | SessionState::Closing | SessionState::Closed => {
                drop(lifecycle);
                tracing::debug!(id = self.id, %state, "Error after closing began: {}", err);
            }
            _ if lifecycle.fatal.is_some() => {
                drop(lifecycle);
                tracing::debug!(id = self.id, "Further error before close: {}", err);
            }
            _ => {
                lifecycle.fatal = Some(err);
                drop(lifecycle);
                let _ = self.stream.shutdown(Shutdown::Both);
            }
        }
    }

    /// Leave the active states and hand back the fatal error, if any
    ///
    /// Moves to `Error` when there is one to report, `Closing` otherwise.
    pub(crate) fn begin_closing(&self) -> Option<BenchError> {
        let mut lifecycle = self.lifecycle.lock();
        let fatal = lifecycle.fatal.take();
        let state = if fatal.is_some() {
            SessionState::Error
        } else {
            SessionState::Closing
        };
        tracing::trace!(id = self.id, from = %lifecycle.state, to = %state, "State change");
        lifecycle.state = state;
        fatal
    }

    pub(crate) fn record_read(&self, bytes: usize) {
        self.stats
            .bytes_read
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn record_packet(&self) {
        self.stats.packets_read.fetch_add(1, Ordering::Relaxed);
    }

    /// A payload was queued for pooled dispatch
    pub(crate) fn task_queued(&self) {
        self.lifecycle.lock().pending += 1;
    }

    /// Whether a queued payload may still start; false once closed
    pub(crate) fn try_enter_task(&self) -> bool {
        self.lifecycle.lock().state != SessionState::Closed
    }

    /// A queued payload ran or was discarded
    pub(crate) fn task_finished(&self) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.pending = lifecycle.pending.saturating_sub(1);
        if lifecycle.pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Wait up to `timeout` for queued and running payloads to finish
    ///
    /// Returns the number still outstanding.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut lifecycle = self.lifecycle.lock();
        while lifecycle.pending > 0 {
            if self.drained.wait_until(&mut lifecycle, deadline).timed_out() {
                break;
            }
        }
        lifecycle.pending
    }

    /// Tear down the transport in both directions
    pub(crate) fn shutdown_transport(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_active_ms.fetch_max(elapsed, Ordering::Relaxed);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}
