//! Peer certificate inspection after the handshake.

use std::fmt;

use rustls::pki_types::CertificateDer;
use thiserror::Error;
use x509_parser::prelude::*;

/// Why an otherwise successful handshake is not allowed to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("expected exactly one peer certificate, got {0}")]
    UnexpectedCertificateCount(usize),
}

/// Authorize a session from the certificates the peer presented.
///
/// Chain validation already happened inside the TLS layer; this only enforces
/// that exactly one certificate was presented and returns it.
pub fn authorize_peer<'a, 'c>(
    peer_certificates: Option<&'a [CertificateDer<'c>]>,
) -> Result<&'a CertificateDer<'c>, AuthorizationError> {
    match peer_certificates.unwrap_or_default() {
        [cert] => Ok(cert),
        certs => Err(AuthorizationError::UnexpectedCertificateCount(certs.len())),
    }
}

/// Summary of a client certificate, safe to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Subject common name, or the full subject DN when there is no CN.
    pub subject: String,
    /// Issuer common name, or the full issuer DN when there is no CN.
    pub issuer: String,
    /// Serial number in hex.
    pub serial: String,
}

impl PeerIdentity {
    /// Parse the identity out of a DER certificate. Returns `None` if the
    /// certificate cannot be parsed; the handshake already vouched for it, so
    /// this only affects logging.
    pub fn from_der(cert: &CertificateDer<'_>) -> Option<Self> {
        let (_, parsed) = parse_x509_certificate(cert.as_ref()).ok()?;
        Some(Self {
            subject: name_summary(parsed.subject()),
            issuer: name_summary(parsed.issuer()),
            serial: parsed.raw_serial_as_string(),
        })
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (issuer {})", self.subject, self.issuer)
    }
}

fn name_summary(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| name.to_string())
}
