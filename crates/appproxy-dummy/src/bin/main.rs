//! appproxy-dummy - reference application behind the socket bridge.
//!
//! Serves engine calls with a [`DummyState`] and submits every line read
//! from stdin as a transaction.

use anyhow::{bail, Context, Result};
use appproxy_core::{Idempotent, ProxyConfig, SocketConfig};
use appproxy_dummy::logging::{init_logging, LogFormat};
use appproxy_dummy::DummyState;
use appproxy_socket::SocketAppClient;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Dummy application for the appproxy socket bridge
#[derive(Parser, Debug)]
#[command(name = "appproxy-dummy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML proxy configuration; overrides the address flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve engine calls on
    #[arg(long, default_value = "127.0.0.1:1339")]
    listen: SocketAddr,

    /// Address of the engine's submit listener
    #[arg(long, default_value = "127.0.0.1:1338")]
    engine: SocketAddr,

    /// Per-call timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Args {
    fn socket_config(&self) -> Result<SocketConfig> {
        match &self.config {
            Some(path) => match ProxyConfig::load_yaml(path)
                .with_context(|| format!("loading {}", path.display()))?
            {
                ProxyConfig::Socket(socket) => Ok(socket),
                ProxyConfig::Inmem => bail!("{} selects the inmem proxy", path.display()),
            },
            None => Ok(SocketConfig::new(self.listen, self.engine)
                .with_timeout(Duration::from_millis(self.timeout_ms))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format);

    let config = args.socket_config()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.bind_addr,
        engine = %config.client_addr,
        timeout_ms = config.timeout_ms,
        "starting dummy application"
    );

    let app = SocketAppClient::bind(&config, Idempotent::new(DummyState::new()))
        .await
        .context("binding engine listener")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    tracing::info!("stdin closed, serving engine calls until interrupted");
                    tokio::signal::ctrl_c().await?;
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match app.submit_tx(line.as_bytes().to_vec()).await {
                    Ok(()) => tracing::debug!(tx = %line, "transaction submitted"),
                    Err(e) => tracing::warn!(tx = %line, error = %e, "transaction not submitted"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let state = app.handler().inner();
    tracing::info!(
        committed = state.committed_transactions().len(),
        state_hash = %hex::encode(state.state_hash()),
        "shutting down"
    );
    app.shutdown();
    Ok(())
}
