//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Environment variable read for the server key when nothing else is configured.
pub const DEFAULT_KEY_ENV: &str = "SERVERCERT_KEY";

/// Root configuration for the socket proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, accept backoff).
    pub listener: ListenerConfig,

    /// The local socket sessions are bridged to.
    pub backend: BackendConfig,

    /// Server identity and trusted client issuers.
    pub tls: TlsConfig,

    /// Byte relay tuning.
    pub relay: RelayConfig,

    /// Shutdown behaviour for in-flight sessions.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4431").
    ///
    /// The host part may also be an IP prefix such as "100.64.0.0/10", which is
    /// resolved to the first local interface address inside it.
    pub bind_address: String,

    /// Fixed pause after a transient accept error, in milliseconds.
    pub accept_backoff_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4431".to_string(),
            accept_backoff_ms: 1000,
        }
    }
}

/// Backend socket configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Path of the Unix domain socket to bridge to.
    pub socket_path: PathBuf,

    /// Connect timeout for the backend socket in seconds.
    pub dial_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker.sock"),
            dial_timeout_secs: 5,
        }
    }
}

/// TLS configuration for the listener.
///
/// The private key comes either from `key_path` (PEM file) or from the
/// environment variable named by `key_env` (base64-encoded PEM). When both are
/// set, `key_path` wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the server certificate chain (PEM).
    pub cert_path: PathBuf,

    /// Path to the server private key (PEM).
    pub key_path: Option<PathBuf>,

    /// Environment variable holding the base64-encoded PEM private key.
    pub key_env: Option<String>,

    /// Path to the bundle of CAs trusted to issue client certificates (PEM).
    pub client_ca_path: PathBuf,

    /// TLS handshake timeout in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("server.crt"),
            key_path: None,
            key_env: Some(DEFAULT_KEY_ENV.to_string()),
            client_ca_path: PathBuf::from("clients-ca.crt"),
            handshake_timeout_secs: 10,
        }
    }
}

/// Byte relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Copy buffer size per direction in bytes.
    pub buffer_size: usize,

    /// Close a session after this many seconds without traffic in either
    /// direction. Zero disables idle reaping.
    pub idle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            idle_timeout_secs: 0,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight sessions may keep running after the listener stops,
    /// in seconds. Sessions still open afterwards are closed.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for production.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
