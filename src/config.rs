//! Configuration for framebench
//!
//! Centralized configuration with the harness defaults.

use std::time::Duration;

use crate::error::{BenchError, Result};

/// Per-session settings applied when a connection is opened
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name used in logs and `Session::stat`
    pub name: String,

    /// Largest payload a frame may declare (bytes)
    pub max_msg_len: usize,

    /// Deadline for the rest of a frame once its first bytes have arrived
    pub read_timeout: Duration,

    /// Deadline for each response write
    pub write_timeout: Duration,

    /// Interval between `on_cron` ticks
    pub cron_period: Duration,

    /// Grace period for queued and running work once closing begins
    pub wait_time: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "hello".to_string(),
            max_msg_len: 128 * 1024, // 128 KB
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
            cron_period: Duration::from_secs(20),
            wait_time: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Reject settings the session loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_msg_len == 0 {
            return Err(BenchError::Config("max message length must be non-zero".to_string()));
        }
        if self.max_msg_len > u32::MAX as usize {
            return Err(BenchError::Config(format!(
                "max message length {} does not fit a 4-byte length prefix",
                self.max_msg_len
            )));
        }
        if self.cron_period.is_zero() {
            return Err(BenchError::Config("cron period must be non-zero".to_string()));
        }
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(BenchError::Config("socket timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Low-level socket tuning applied once at open
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Disable Nagle's algorithm
    pub nodelay: bool,

    /// OS keep-alive probe period; `None` leaves keep-alive off
    pub keepalive: Option<Duration>,

    /// SO_RCVBUF (bytes)
    pub recv_buffer_size: usize,

    /// SO_SNDBUF (bytes)
    pub send_buffer_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: Some(Duration::from_secs(10)),
            recv_buffer_size: 262_144,
            send_buffer_size: 524_288,
        }
    }
}

/// What `TaskPool::submit` does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Block the submitting session until space frees up (back-pressure)
    Block,

    /// Fail with `BenchError::Overloaded`
    Reject,
}

/// How tasks are spread across pool workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrdering {
    /// One shared queue; no ordering between tasks of the same session
    Unordered,

    /// Tasks of a session always go to the same worker, FIFO
    PerSession,
}

/// Dispatch pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads
    pub size: usize,

    /// Total queued-task capacity across all queues
    pub queue_capacity: usize,

    pub overflow: OverflowPolicy,

    pub ordering: TaskOrdering,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2000,
            queue_capacity: 2000,
            overflow: OverflowPolicy::Block,
            ordering: TaskOrdering::Unordered,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(BenchError::Config("pool size must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(BenchError::Config(
                "pool queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Diagnostics HTTP endpoint; `None` disables it
    pub diagnostics_addr: Option<String>,

    /// How often the non-blocking accept loop checks for shutdown
    pub accept_poll_interval: Duration,

    // -------------------------------------------------------------------------
    // Session Defaults
    // -------------------------------------------------------------------------
    pub session: SessionConfig,

    pub socket: SocketOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8090".to_string(),
            diagnostics_addr: Some("0.0.0.0:65432".to_string()),
            accept_poll_interval: Duration::from_millis(50),
            session: SessionConfig::default(),
            socket: SocketOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Reject settings the session loop cannot run with
    ///
    /// The session section holds the defaults factories usually hand out.
    pub fn validate(&self) -> Result<()> {
        if self.accept_poll_interval.is_zero() {
            return Err(BenchError::Config("accept poll interval must be non-zero".to_string()));
        }
        self.session.validate()
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set or disable the diagnostics endpoint address
    pub fn diagnostics_addr(mut self, addr: Option<String>) -> Self {
        self.config.diagnostics_addr = addr;
        self
    }

    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.config.accept_poll_interval = interval;
        self
    }

    /// Set the session name
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.config.session.name = name.into();
        self
    }

    /// Set the maximum payload length (in bytes)
    pub fn max_msg_len(mut self, len: usize) -> Self {
        self.config.session.max_msg_len = len;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.write_timeout = timeout;
        self
    }

    pub fn cron_period(mut self, period: Duration) -> Self {
        self.config.session.cron_period = period;
        self
    }

    pub fn wait_time(mut self, wait: Duration) -> Self {
        self.config.session.wait_time = wait;
        self
    }

    /// Replace the socket tuning options
    pub fn socket(mut self, socket: SocketOptions) -> Self {
        self.config.socket = socket;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
