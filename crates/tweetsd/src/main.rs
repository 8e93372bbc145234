//! Tweets service daemon - RESP server over the cache-aside tweet controller

mod handler;
mod resp;

use anyhow::Result;
use bytes::BytesMut;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use tweetcache::{CacheConfig, TweetController, DEFAULT_CAPACITY};
use tweetstore::{MemoryMediaStore, MemoryRepository, RequestContext};

use crate::handler::CommandHandler;
use crate::resp::RespValue;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    bind: String,

    /// Cache capacity (number of entries, both key shapes count)
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Serve every request straight from the repository
    #[arg(long)]
    no_cache: bool,

    /// Per-command deadline in milliseconds
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    info!("Starting tweetsd v{}", env!("CARGO_PKG_VERSION"));

    let cache = CacheConfig::new()
        .with_capacity(args.capacity)
        .with_enabled(!args.no_cache)
        .build()?;
    match &cache {
        Some(cache) => info!(capacity = cache.capacity(), "cache enabled"),
        None => info!("cache disabled"),
    }

    let repo = Arc::new(MemoryRepository::new());
    let media = Arc::new(MemoryMediaStore::new());
    let handler = Arc::new(CommandHandler::new(TweetController::new(repo, media, cache)));
    let timeout = Duration::from_millis(args.request_timeout_ms);
    let root = RequestContext::background();

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Server listening on {}", args.bind);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                root.cancel();
                return Ok(());
            }
        };

        match accepted {
            Ok((stream, addr)) => {
                let handler = Arc::clone(&handler);
                let conn_ctx = root.child();
                let span = info_span!("conn", %addr);

                tokio::spawn(
                    async move {
                        info!("New connection");
                        if let Err(e) = handle_client(stream, &handler, &conn_ctx, timeout).await {
                            error!("Error handling client: {}", e);
                        }
                        conn_ctx.cancel();
                        info!("Connection closed");
                    }
                    .instrument(span),
                );
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// `RUST_LOG` directives when set and valid, `info` otherwise
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn handle_client(
    mut stream: TcpStream,
    handler: &CommandHandler,
    conn_ctx: &RequestContext,
    timeout: Duration,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        loop {
            match RespValue::parse(&mut buffer) {
                Ok(Some(cmd)) => {
                    let ctx = conn_ctx.child_with_timeout(timeout);
                    let response = handler.handle(cmd, &ctx).await;
                    stream.write_all(&response.serialize()).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Parse error: {}", e);
                    stream.write_all(&RespValue::err(&e).serialize()).await?;
                    buffer.clear();
                    break;
                }
            }
        }
    }
}
