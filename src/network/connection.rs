//! Connection Driver
//!
//! Runs one session's lifecycle on its own thread: socket tuning, open,
//! the read/decode/dispatch loop with cron ticks, error reporting, the
//! closing grace period and teardown.

use std::io::{self, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

use socket2::{SockRef, TcpKeepalive};

use super::factory::SessionSetup;
use super::session::{Session, SessionState};
use crate::config::SocketOptions;
use crate::dispatch::Dispatcher;
use crate::error::{BenchError, IoOp, Result};
use crate::handler::EventHandler;
use crate::protocol::ReceiveBuffer;

/// Drives a single accepted connection
pub struct Connection {
    /// Read half
    reader: TcpStream,

    buffer: ReceiveBuffer,
    session: Arc<Session>,
    handler: Arc<dyn EventHandler>,
    dispatcher: Dispatcher,
}

impl Connection {
    /// Tune the socket and build the session
    ///
    /// Failure here happens before open, so no handler event fires.
    pub fn new(stream: TcpStream, setup: SessionSetup, dispatcher: Dispatcher) -> Result<Self> {
        setup.config.validate()?;
        apply_socket_options(&stream, &setup.socket)?;

        // Short socket timeout so cron ticks fire on idle connections; the
        // read timeout itself is enforced against buffered partial frames.
        let config = &setup.config;
        stream.set_read_timeout(Some(config.read_timeout.min(config.cron_period)))?;
        stream.set_write_timeout(Some(config.write_timeout))?;

        let reader = stream.try_clone()?;
        let session = Arc::new(Session::new(stream, setup.config)?);

        Ok(Self {
            reader,
            buffer: ReceiveBuffer::new(session.codec()),
            session,
            handler: setup.handler,
            dispatcher,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run the session to completion (blocking until closed)
    ///
    /// `on_close` has fired when this returns.
    pub fn run(mut self) {
        self.session.set_state(SessionState::Open);

        match self.handler.on_open(&self.session) {
            Ok(()) => {
                self.session.set_state(SessionState::Active);
                tracing::debug!(session = %self.session.name(), id = self.session.id(), "Session active");
                if let Err(e) = self.read_loop() {
                    self.session.fail(e);
                }
            }
            Err(e) => {
                let err = match e {
                    BenchError::Handler(_) => e,
                    other => BenchError::Handler(other.to_string()),
                };
                self.session.fail(err);
            }
        }

        self.finish();
    }

    /// Read, decode and dispatch until the peer leaves, a close is
    /// requested or an error occurs
    fn read_loop(&mut self) -> Result<()> {
        let config = self.session.config().clone();
        let mut next_cron = Instant::now() + config.cron_period;
        let mut last_progress = Instant::now();

        loop {
            match self.buffer.fill_from(&mut self.reader) {
                Ok(0) => {
                    if self.buffer.is_empty() || self.session.is_close_requested() {
                        tracing::debug!(id = self.session.id(), "Connection closed");
                        return Ok(());
                    }
                    return Err(BenchError::Transport(Arc::new(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("connection closed with {} bytes of a partial frame", self.buffer.len()),
                    ))));
                }
                Ok(n) => {
                    last_progress = Instant::now();
                    self.session.record_read(n);
                    while let Some(payload) = self.buffer.next_frame()? {
                        self.session.record_packet();
                        self.dispatcher
                            .dispatch(&self.session, &self.handler, payload)?;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if !self.buffer.is_empty() && last_progress.elapsed() >= config.read_timeout {
                        return Err(BenchError::IoTimeout {
                            op: IoOp::Read,
                            timeout: config.read_timeout,
                        });
                    }
                }
                Err(e) => {
                    if self.session.is_close_requested() {
                        return Ok(());
                    }
                    return Err(BenchError::from_socket(e, IoOp::Read, config.read_timeout));
                }
            }

            if self.session.is_close_requested() {
                return Ok(());
            }

            let now = Instant::now();
            if now >= next_cron {
                self.handler.on_cron(&self.session);
                next_cron = now + config.cron_period;
            }
        }
    }

    /// Report the fatal error if any, give queued work its grace period,
    /// tear down and fire `on_close`
    fn finish(self) {
        let session = &self.session;

        if let Some(err) = session.begin_closing() {
            self.handler.on_error(session, &err);
            session.set_state(SessionState::Closing);
        }

        let _ = self.reader.shutdown(std::net::Shutdown::Read);

        let outstanding = session.wait_drained(session.config().wait_time);
        if outstanding > 0 {
            tracing::warn!(
                id = session.id(),
                outstanding,
                "Wait time elapsed, discarding queued messages"
            );
        }

        session.set_state(SessionState::Closed);
        session.shutdown_transport();
        self.handler.on_close(session);
    }
}

/// Nagle off, keep-alive probes and socket buffer sizes
fn apply_socket_options(stream: &TcpStream, options: &SocketOptions) -> Result<()> {
    let socket = SockRef::from(stream);

    socket.set_nodelay(options.nodelay)?;

    if let Some(period) = options.keepalive {
        let keepalive = TcpKeepalive::new().with_time(period);
        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
        let keepalive = keepalive.with_interval(period);
        socket.set_tcp_keepalive(&keepalive)?;
    } else {
        socket.set_keepalive(false)?;
    }

    socket.set_recv_buffer_size(options.recv_buffer_size)?;
    socket.set_send_buffer_size(options.send_buffer_size)?;
    Ok(())
}
