//! rustls server configuration requiring verified client certificates.

use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use super::{CredentialError, Credentials};

/// Build the TLS acceptor shared by every session.
///
/// Clients must present a certificate chaining to one of the trusted issuers
/// or the handshake fails; anonymous clients are never allowed.
pub fn build_acceptor(credentials: Credentials) -> Result<TlsAcceptor, CredentialError> {
    let Credentials { identity, issuers } = credentials;

    if issuers.is_empty() {
        return Err(CredentialError::Config("trusted issuer pool is empty".into()));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let verifier = WebPkiClientVerifier::builder_with_provider(
        Arc::new(issuers.into_root_store()),
        provider.clone(),
    )
    .build()
    .map_err(|e| CredentialError::Config(format!("Failed to build client verifier: {}", e)))?;

    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CredentialError::Config(format!("Failed to set protocol versions: {}", e)))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(identity.cert_chain, identity.key)
        .map_err(|e| CredentialError::Config(format!("Failed to build TLS config: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
