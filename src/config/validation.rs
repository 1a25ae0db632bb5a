//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check that a private key source is configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::Path;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ProxyConfig;
use crate::net::addr::split_host_port;
use crate::tls::KeySource;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {address:?} is invalid: {reason}")]
    BindAddress { address: String, reason: String },

    #[error("{field} must not be empty")]
    EmptyPath { field: &'static str },

    #[error("tls: one of key_path or key_env must be set")]
    KeySource,

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("observability.log_level {0:?} is not a valid filter directive")]
    LogLevel(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = split_host_port(&config.listener.bind_address) {
        errors.push(ValidationError::BindAddress {
            address: config.listener.bind_address.clone(),
            reason: e.to_string(),
        });
    }

    check_path(&mut errors, &config.backend.socket_path, "backend.socket_path");
    check_path(&mut errors, &config.tls.cert_path, "tls.cert_path");
    check_path(&mut errors, &config.tls.client_ca_path, "tls.client_ca_path");

    // key_path wins over key_env, so only a missing source is an error.
    if KeySource::from_config(&config.tls).is_none() {
        errors.push(ValidationError::KeySource);
    }

    check_nonzero(&mut errors, config.listener.accept_backoff_ms, "listener.accept_backoff_ms");
    check_nonzero(&mut errors, config.backend.dial_timeout_secs, "backend.dial_timeout_secs");
    check_nonzero(&mut errors, config.tls.handshake_timeout_secs, "tls.handshake_timeout_secs");
    check_nonzero(&mut errors, config.relay.buffer_size as u64, "relay.buffer_size");

    if config.observability.log_level.parse::<EnvFilter>().is_err() {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_path(errors: &mut Vec<ValidationError>, path: &Path, field: &'static str) {
    if path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyPath { field });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, value: u64, field: &'static str) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}
