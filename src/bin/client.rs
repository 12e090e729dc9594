//! framebench Client
//!
//! Load generator: opens connections, sends frames and, when the server
//! echoes, reads the echoes back and reports throughput.

use std::io::BufWriter;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use framebench::protocol::{FrameCodec, ReceiveBuffer};
use framebench::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// framebench Client
#[derive(Parser, Debug)]
#[command(name = "framebench-client")]
#[command(about = "Load generator for framebench-server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8090")]
    server: String,

    /// Concurrent connections
    #[arg(short, long, default_value = "1")]
    connections: usize,

    /// Messages per connection
    #[arg(short, long, default_value = "1000")]
    messages: usize,

    /// Payload size in bytes
    #[arg(long, default_value = "64")]
    size: usize,

    /// Read back one echoed frame per message
    #[arg(long)]
    expect_echo: bool,

    /// Socket read timeout while waiting for echoes (milliseconds)
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let started = Instant::now();

    let workers: Vec<_> = (0..args.connections)
        .map(|conn| {
            let server = args.server.clone();
            let (messages, size, echo) = (args.messages, args.size, args.expect_echo);
            let timeout = Duration::from_millis(args.timeout_ms);
            thread::spawn(move || run_connection(conn, &server, messages, size, echo, timeout))
        })
        .collect();

    let mut sent = 0usize;
    let mut received = 0usize;
    let mut failed = 0usize;
    for worker in workers {
        match worker.join() {
            Ok(Ok((s, r))) => {
                sent += s;
                received += r;
            }
            Ok(Err(e)) => {
                tracing::error!("Connection failed: {}", e);
                failed += 1;
            }
            Err(_) => failed += 1,
        }
    }

    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    println!(
        "sent {} frames, received {} echoes, {} failed connections in {:.3}s ({:.0} msg/s)",
        sent,
        received,
        failed,
        elapsed,
        sent as f64 / elapsed
    );
}

fn run_connection(
    conn: usize,
    server: &str,
    messages: usize,
    size: usize,
    expect_echo: bool,
    timeout: Duration,
) -> Result<(usize, usize)> {
    let stream = TcpStream::connect(server)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;

    let codec = FrameCodec::new(size.max(1));
    let payload = vec![b'x'; size];
    let mut reader = stream.try_clone()?;
    let mut writer = BufWriter::new(stream);
    let mut buffer = ReceiveBuffer::new(codec);

    let (mut sent, mut received) = (0, 0);
    for _ in 0..messages {
        codec.write_frame(&mut writer, &payload)?;
        sent += 1;
        if expect_echo {
            loop {
                if let Some(echo) = buffer.next_frame()? {
                    debug_assert_eq!(echo.len(), size);
                    received += 1;
                    break;
                }
                if buffer.fill_from(&mut reader)? == 0 {
                    tracing::warn!(conn, "Server closed the connection");
                    return Ok((sent, received));
                }
            }
        }
    }

    tracing::debug!(conn, sent, received, "Connection done");
    Ok((sent, received))
}
