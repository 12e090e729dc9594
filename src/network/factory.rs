//! Session factory
//!
//! Called once per accepted connection to pick its settings and handler.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{SessionConfig, SocketOptions};
use crate::error::Result;
use crate::handler::EventHandler;

/// Everything a new session needs
#[derive(Clone)]
pub struct SessionSetup {
    pub config: SessionConfig,
    pub socket: SocketOptions,
    pub handler: Arc<dyn EventHandler>,
}

impl SessionSetup {
    /// Default session config and socket options
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            config: SessionConfig::default(),
            socket: SocketOptions::default(),
            handler,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_socket(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }
}

/// Builds the setup for each accepted connection
///
/// An error drops the connection before it opens.
pub trait SessionFactory: Send + Sync {
    fn new_session(&self, peer: SocketAddr) -> Result<SessionSetup>;
}

impl<F> SessionFactory for F
where
    F: Fn(SocketAddr) -> Result<SessionSetup> + Send + Sync,
{
    fn new_session(&self, peer: SocketAddr) -> Result<SessionSetup> {
        self(peer)
    }
}
