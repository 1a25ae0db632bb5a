//! sockproxy
//!
//! Exposes a local Unix domain socket (by default the Docker daemon socket)
//! over TCP, to clients holding a certificate signed by a trusted issuer.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                     SOCKPROXY                     │
//!                        │                                                   │
//!   TLS client           │  ┌─────────┐   ┌──────────────┐   ┌────────────┐  │
//!   ─────────────────────┼─▶│   net   │──▶│    bridge    │──▶│   bridge   │──┼──▶ Unix socket
//!                        │  │listener │   │   session    │   │   relay    │  │    (backend)
//!                        │  └─────────┘   │ (mTLS, gate) │   │ (both ways)│  │
//!                        │                └──────────────┘   └────────────┘  │
//!                        │                                                   │
//!                        │  ┌─────────────────────────────────────────────┐  │
//!                        │  │           Cross-Cutting Concerns            │  │
//!                        │  │  config · tls credentials · resilience ·    │  │
//!                        │  │  observability · lifecycle                  │  │
//!                        │  └─────────────────────────────────────────────┘  │
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use sockproxy::config::{read_config, validate_config, ConfigError, LogFormat, ProxyConfig};
use sockproxy::lifecycle::{self, signals, Shutdown};
use sockproxy::observability;

#[derive(Parser, Debug)]
#[command(name = "sockproxy", version, about = "Serve a Unix socket over mutual TLS")]
struct Cli {
    /// TOML configuration file. Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, `host:port`. The host may be a prefix such as
    /// `100.64.0.0/10` (CGNAT space, also used by Tailscale) to bind the
    /// matching local interface address.
    #[arg(long)]
    addr: Option<String>,

    /// Backend Unix socket.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Server certificate chain (PEM).
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Server private key (PEM file).
    #[arg(long, conflicts_with = "key_env")]
    key: Option<PathBuf>,

    /// Environment variable holding the base64 encoded PEM server key.
    #[arg(long)]
    key_env: Option<String>,

    /// Trusted issuers for client certificates (PEM bundle).
    #[arg(long)]
    client_ca: Option<PathBuf>,

    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(addr) = self.addr {
            config.listener.bind_address = addr;
        }
        if let Some(socket) = self.socket {
            config.backend.socket_path = socket;
        }
        if let Some(cert) = self.cert {
            config.tls.cert_path = cert;
        }
        if let Some(key) = self.key {
            config.tls.key_path = Some(key);
            config.tls.key_env = None;
        }
        if let Some(key_env) = self.key_env {
            config.tls.key_env = Some(key_env);
            config.tls.key_path = None;
        }
        if let Some(client_ca) = self.client_ca {
            config.tls.client_ca_path = client_ca;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    observability::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sockproxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.socket_path.display(),
        drain_timeout_secs = config.shutdown.drain_timeout_secs,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone())?;

    if let Err(e) = lifecycle::run(&config, shutdown).await {
        tracing::error!(error = %e, "Proxy stopped with an error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
