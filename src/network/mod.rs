//! Network Module
//!
//! TCP server and per-connection sessions.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop
//! - One thread per accepted connection driving its session
//! - Optional shared task pool for `on_message`

mod connection;
mod factory;
mod server;
mod session;

pub use connection::Connection;
pub use factory::{SessionFactory, SessionSetup};
pub use server::Server;
pub use session::{Session, SessionState};
