//! TCP Server
//!
//! Accepts connections and runs each session on its own thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use metrics::{counter, gauge};
use parking_lot::Mutex;

use super::connection::Connection;
use super::factory::SessionFactory;
use super::session::Session;
use crate::config::ServerConfig;
use crate::diagnostics::{
    SESSIONS_ACCEPTED_TOTAL, SESSIONS_ACTIVE, SESSIONS_CLOSED_TOTAL, SESSIONS_REJECTED_TOTAL,
};
use crate::dispatch::{Dispatcher, TaskPool};
use crate::error::Result;

type SessionMap = Arc<Mutex<HashMap<u64, Arc<Session>>>>;

/// TCP server for framebench
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    factory: Box<dyn SessionFactory>,
    pool: Option<Arc<TaskPool>>,

    sessions: SessionMap,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl Server {
    /// Bind the listener
    ///
    /// With a pool, every session dispatches `on_message` through it and
    /// `close` shuts it down.
    pub fn new(
        config: ServerConfig,
        factory: impl SessionFactory + 'static,
        pool: Option<Arc<TaskPool>>,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            listener,
            local_addr,
            factory: Box::new(factory),
            pool,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            handles: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the accept loop (blocking until `close`)
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr,
            pooled = self.pool.is_some(),
            "Server listening"
        );

        let poll_interval = self.config.accept_poll_interval;
        while !self.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.accept(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.reap_finished();
                    thread::sleep(poll_interval);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(poll_interval);
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "Accept loop stopped");
        Ok(())
    }

    /// Stop accepting, close every session and release the pool
    ///
    /// Each session gets its wait time for queued work before it is torn
    /// down. Idempotent; returns once every session thread and pool
    /// worker has exited.
    pub fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Server shutting down");

        // Taking the handles under the lock fences off any accept in flight.
        let handles = std::mem::take(&mut *self.handles.lock());
        let sessions: Vec<Arc<Session>> = self.sessions.lock().values().cloned().collect();
        for session in &sessions {
            session.close();
        }

        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Session thread panicked");
            }
        }

        if let Some(pool) = &self.pool {
            pool.shutdown();
        }

        tracing::info!(sessions = sessions.len(), "Server stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Sessions that have not finished closing yet
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn pool(&self) -> Option<&Arc<TaskPool>> {
        self.pool.as_ref()
    }

    fn accept(&self, stream: TcpStream, peer: SocketAddr) {
        counter!(SESSIONS_ACCEPTED_TOTAL).increment(1);

        // Some platforms hand out sockets inheriting the listener's mode.
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!(%peer, "Failed to set blocking mode: {}", e);
            counter!(SESSIONS_REJECTED_TOTAL).increment(1);
            return;
        }

        let setup = match self.factory.new_session(peer) {
            Ok(setup) => setup,
            Err(e) => {
                tracing::warn!(%peer, "Session factory refused connection: {}", e);
                counter!(SESSIONS_REJECTED_TOTAL).increment(1);
                return;
            }
        };

        let dispatcher = match &self.pool {
            Some(pool) => Dispatcher::pooled(Arc::clone(pool)),
            None => Dispatcher::Inline,
        };

        let connection = match Connection::new(stream, setup, dispatcher) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(%peer, "Failed to set up session: {}", e);
                counter!(SESSIONS_REJECTED_TOTAL).increment(1);
                return;
            }
        };

        let mut handles = self.handles.lock();
        if self.is_shutdown() {
            return;
        }

        let session = Arc::clone(connection.session());
        let id = session.id();
        self.sessions.lock().insert(id, session);

        gauge!(SESSIONS_ACTIVE).increment(1.0);

        let sessions = Arc::clone(&self.sessions);
        let spawned = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || {
                connection.run();
                sessions.lock().remove(&id);
                gauge!(SESSIONS_ACTIVE).decrement(1.0);
                counter!(SESSIONS_CLOSED_TOTAL).increment(1);
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!(%peer, id, "Accepted connection");
                handles.push(handle);
            }
            Err(e) => {
                tracing::error!(%peer, "Failed to spawn session thread: {}", e);
                self.sessions.lock().remove(&id);
                gauge!(SESSIONS_ACTIVE).decrement(1.0);
                counter!(SESSIONS_REJECTED_TOTAL).increment(1);
            }
        }
    }

    /// Drop join handles of sessions that already ended
    fn reap_finished(&self) {
        self.handles.lock().retain(|handle| !handle.is_finished());
    }
}
