//! framebench Server Binary
//!
//! Starts the benchmark TCP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use framebench::config::{OverflowPolicy, PoolConfig, TaskOrdering};
use framebench::dispatch::TaskPool;
use framebench::handler::{EchoHandler, EventHandler, SleepHandler};
use framebench::network::{Server, SessionSetup};
use framebench::{diagnostics, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HandlerKind {
    /// Write every payload back
    Echo,
    /// Log and block for --sleep-ms per message
    Sleep,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Overflow {
    Block,
    Reject,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    Unordered,
    PerSession,
}

/// framebench Server
#[derive(Parser, Debug)]
#[command(name = "framebench-server")]
#[command(about = "TCP harness for benchmarking length-prefixed framing")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:8090")]
    listen: String,

    /// Dispatch on_message through the task pool
    #[arg(long)]
    task_pool: bool,

    /// Task pool worker count
    #[arg(long, default_value = "2000")]
    task_pool_size: usize,

    /// Task pool queue capacity (defaults to the pool size)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// What to do when the task pool queue is full
    #[arg(long, value_enum, default_value = "block")]
    overflow: Overflow,

    /// Task ordering across pool workers
    #[arg(long, value_enum, default_value = "unordered")]
    ordering: Order,

    /// Diagnostics HTTP port (0 disables)
    #[arg(long, default_value = "65432")]
    diagnostics_port: u16,

    /// Message handler
    #[arg(long, value_enum, default_value = "sleep")]
    handler: HandlerKind,

    /// Per-message delay for the sleep handler (milliseconds)
    #[arg(long, default_value = "10000")]
    sleep_ms: u64,

    /// Maximum payload length in bytes
    #[arg(long, default_value = "131072")]
    max_msg_len: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,framebench=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("framebench server v{}", framebench::VERSION);

    let diagnostics_addr = (args.diagnostics_port != 0).then(|| format!("0.0.0.0:{}", args.diagnostics_port));
    let config = ServerConfig::builder()
        .listen_addr(&args.listen)
        .diagnostics_addr(diagnostics_addr)
        .max_msg_len(args.max_msg_len)
        .build();

    let pool = if args.task_pool {
        let pool_config = PoolConfig {
            size: args.task_pool_size,
            queue_capacity: args.queue_capacity.unwrap_or(args.task_pool_size),
            overflow: match args.overflow {
                Overflow::Block => OverflowPolicy::Block,
                Overflow::Reject => OverflowPolicy::Reject,
            },
            ordering: match args.ordering {
                Order::Unordered => TaskOrdering::Unordered,
                Order::PerSession => TaskOrdering::PerSession,
            },
        };
        match TaskPool::new(pool_config) {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                tracing::error!("Failed to start task pool: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let handler: Arc<dyn EventHandler> = match args.handler {
        HandlerKind::Echo => Arc::new(EchoHandler::new()),
        HandlerKind::Sleep => Arc::new(SleepHandler::new(Duration::from_millis(args.sleep_ms))),
    };

    let session_config = config.session.clone();
    let socket = config.socket.clone();
    let factory = move |_peer: SocketAddr| -> framebench::Result<SessionSetup> {
        Ok(SessionSetup::new(Arc::clone(&handler))
            .with_config(session_config.clone())
            .with_socket(socket.clone()))
    };

    let server = match Server::new(config.clone(), factory, pool) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(addr) = &config.diagnostics_addr {
        let started = diagnostics::install_recorder().and_then(|handle| diagnostics::spawn(addr, handle));
        if let Err(e) = started {
            tracing::error!("Failed to start diagnostics endpoint: {}", e);
            std::process::exit(1);
        }
    }

    // Signal delivery: SIGINT, SIGTERM and SIGHUP all request shutdown
    let (signal_tx, signal_rx) = crossbeam::channel::bounded::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    let acceptor = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.run())
    };

    tracing::info!("Server started, listening at {}", server.local_addr());

    let _ = signal_rx.recv();
    tracing::info!("Received shutdown signal");
    server.close();

    match acceptor.join() {
        Ok(Ok(())) => tracing::info!("Server stopped"),
        Ok(Err(e)) => {
            tracing::error!("Server error: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            tracing::error!("Accept loop panicked");
            std::process::exit(1);
        }
    }
}
