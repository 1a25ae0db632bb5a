//! Mutual TLS support.
//!
//! # Data Flow
//! ```text
//! TlsConfig (paths, key env var name)
//!     → credentials.rs (Server Identity + Trusted Issuer Pool)
//!     → acceptor.rs (rustls ServerConfig requiring verified client certs)
//!     → shared read-only by every session via Arc
//!
//! After each handshake:
//!     → peer.rs (cardinality gate, identity summary for logs)
//! ```
//!
//! # Security
//!
//! - Uses rustls with the ring provider; TLS 1.2 minimum, TLS 1.3 preferred
//! - Client certificates are mandatory and must chain to a configured issuer
//! - Credentials are injected at startup; nothing is compiled in

mod acceptor;
mod credentials;
mod peer;

pub use acceptor::build_acceptor;
pub use credentials::{
    decode_base64_env, load_credentials, load_server_identity, load_trusted_issuers,
    parse_certificates, parse_private_key, trusted_issuers_from_pem, Credentials, KeySource,
    ServerIdentity, TrustedIssuers,
};
pub use peer::{authorize_peer, AuthorizationError, PeerIdentity};

use thiserror::Error;

/// Error type for loading credentials and building the TLS configuration.
///
/// Every variant is a startup error; none of them are retried.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read {kind} from {origin}: {source}")]
    Read {
        kind: &'static str,
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable {0} is not defined")]
    MissingEnv(String),

    #[error("environment variable {name} is not valid base64: {source}")]
    Base64 {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("invalid PEM in {origin}: {source}")]
    Pem {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("cannot trust issuer certificate from {origin}: {source}")]
    Issuer {
        origin: String,
        #[source]
        source: rustls::Error,
    },

    #[error("no private key source configured (set key_path or key_env)")]
    NoKeySource,

    #[error("invalid TLS configuration: {0}")]
    Config(String),
}
