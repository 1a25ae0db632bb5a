//! Credential loading.
//!
//! Produces the two read-only inputs of the TLS layer: the Server Identity
//! (certificate chain + private key) and the Trusted Issuer Pool (CAs allowed to
//! issue client certificates). How they are stored is a deployment concern; the
//! rest of the crate only sees the loaded values or a [`CredentialError`].

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;

use super::CredentialError;
use crate::config::TlsConfig;

/// Where the server private key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// A PEM file on disk.
    File(PathBuf),
    /// An environment variable holding base64-encoded PEM.
    Env(String),
}

impl KeySource {
    /// Pick the key source from configuration. A file path wins over an env var.
    pub fn from_config(config: &TlsConfig) -> Option<Self> {
        if let Some(path) = config.key_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return Some(KeySource::File(path.clone()));
        }
        config
            .key_env
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| KeySource::Env(name.clone()))
    }
}

/// Certificate chain and private key presented to clients.
#[derive(Debug)]
pub struct ServerIdentity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// CAs whose signatures are accepted on client certificates.
#[derive(Debug, Clone)]
pub struct TrustedIssuers {
    roots: RootCertStore,
}

impl TrustedIssuers {
    /// Number of trusted CA certificates.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn into_root_store(self) -> RootCertStore {
        self.roots
    }
}

/// Everything the TLS acceptor needs.
#[derive(Debug)]
pub struct Credentials {
    pub identity: ServerIdentity,
    pub issuers: TrustedIssuers,
}

/// Load the Server Identity and Trusted Issuer Pool described by `config`.
pub fn load_credentials(config: &TlsConfig) -> Result<Credentials, CredentialError> {
    let key_source = KeySource::from_config(config).ok_or(CredentialError::NoKeySource)?;
    let identity = load_server_identity(&config.cert_path, &key_source)?;
    let issuers = load_trusted_issuers(&config.client_ca_path)?;

    tracing::info!(
        cert_path = %config.cert_path.display(),
        chain_len = identity.cert_chain.len(),
        client_ca_path = %config.client_ca_path.display(),
        trusted_issuers = issuers.len(),
        "Credentials loaded"
    );

    Ok(Credentials { identity, issuers })
}

/// Load the server certificate chain and its private key.
pub fn load_server_identity(
    cert_path: &Path,
    key_source: &KeySource,
) -> Result<ServerIdentity, CredentialError> {
    let cert_origin = cert_path.display().to_string();
    let cert_pem = read_file(cert_path, "certificate")?;
    let cert_chain = parse_certificates(&cert_pem, &cert_origin)?;

    let key = match key_source {
        KeySource::File(path) => {
            let key_pem = read_file(path, "private key")?;
            parse_private_key(&key_pem, &path.display().to_string())?
        }
        KeySource::Env(name) => {
            let key_pem = decode_base64_env(name)?;
            parse_private_key(&key_pem, &format!("${}", name))?
        }
    };

    Ok(ServerIdentity { cert_chain, key })
}

/// Load the bundle of CAs trusted to issue client certificates.
pub fn load_trusted_issuers(path: &Path) -> Result<TrustedIssuers, CredentialError> {
    let pem = read_file(path, "client CA bundle")?;
    trusted_issuers_from_pem(&pem, &path.display().to_string())
}

/// Build a Trusted Issuer Pool from PEM text.
pub fn trusted_issuers_from_pem(
    pem: &[u8],
    origin: &str,
) -> Result<TrustedIssuers, CredentialError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(pem, origin)? {
        roots.add(cert).map_err(|source| CredentialError::Issuer {
            origin: origin.to_string(),
            source,
        })?;
    }
    Ok(TrustedIssuers { roots })
}

/// Parse every certificate in a PEM document. An empty result is an error.
pub fn parse_certificates(
    pem: &[u8],
    origin: &str,
) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CredentialError::Pem {
            origin: origin.to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(CredentialError::NoCertificates(origin.to_string()));
    }
    Ok(certs)
}

/// Parse the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM document.
pub fn parse_private_key(
    pem: &[u8],
    origin: &str,
) -> Result<PrivateKeyDer<'static>, CredentialError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| CredentialError::Pem {
            origin: origin.to_string(),
            source,
        })?
        .ok_or_else(|| CredentialError::NoPrivateKey(origin.to_string()))
}

/// Read a required environment variable and decode it as standard base64.
pub fn decode_base64_env(name: &str) -> Result<Vec<u8>, CredentialError> {
    let value = std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingEnv(name.to_string()))?;

    BASE64
        .decode(value.trim())
        .map_err(|source| CredentialError::Base64 {
            name: name.to_string(),
            source,
        })
}

fn read_file(path: &Path, kind: &'static str) -> Result<Vec<u8>, CredentialError> {
    fs::read(path).map_err(|source| CredentialError::Read {
        kind,
        origin: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn key_source_prefers_file() {
        let mut config = TlsConfig::default();
        assert_eq!(
            KeySource::from_config(&config),
            Some(KeySource::Env("SERVERCERT_KEY".into()))
        );

        config.key_path = Some(PathBuf::from("/etc/sockproxy/server.key"));
        assert_eq!(
            KeySource::from_config(&config),
            Some(KeySource::File(PathBuf::from("/etc/sockproxy/server.key")))
        );

        config.key_path = None;
        config.key_env = Some(String::new());
        assert_eq!(KeySource::from_config(&config), None);
    }

    #[test]
    fn parses_certificate_bundle() {
        let (first, _) = self_signed();
        let (second, _) = self_signed();
        let bundle = format!("{}{}", first, second);

        let certs = parse_certificates(bundle.as_bytes(), "bundle").unwrap();
        assert_eq!(certs.len(), 2);

        let issuers = trusted_issuers_from_pem(bundle.as_bytes(), "bundle").unwrap();
        assert_eq!(issuers.len(), 2);
    }

    #[test]
    fn empty_pem_has_no_certificates() {
        let err = parse_certificates(b"not a pem document", "garbage").unwrap_err();
        assert!(matches!(err, CredentialError::NoCertificates(origin) if origin == "garbage"));

        let err = parse_private_key(b"", "empty").unwrap_err();
        assert!(matches!(err, CredentialError::NoPrivateKey(_)));
    }

    #[test]
    fn loads_identity_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_pem, key_pem) = self_signed();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        fs::write(&cert_path, cert_pem).unwrap();
        fs::write(&key_path, key_pem).unwrap();

        let identity = load_server_identity(&cert_path, &KeySource::File(key_path)).unwrap();
        assert_eq!(identity.cert_chain.len(), 1);
    }

    #[test]
    fn loads_key_from_base64_env() {
        let (cert_pem, key_pem) = self_signed();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("server.crt");
        fs::write(&cert_path, cert_pem).unwrap();

        let name = "SOCKPROXY_TEST_KEY_FROM_ENV";
        std::env::set_var(name, BASE64.encode(key_pem));
        let identity = load_server_identity(&cert_path, &KeySource::Env(name.into()));
        std::env::remove_var(name);

        assert!(identity.is_ok());
    }

    #[test]
    fn missing_env_key_is_reported() {
        let err = decode_base64_env("SOCKPROXY_TEST_KEY_UNSET").unwrap_err();
        assert!(matches!(
            err,
            CredentialError::MissingEnv(name) if name == "SOCKPROXY_TEST_KEY_UNSET"
        ));
    }

    #[test]
    fn invalid_base64_is_reported() {
        let name = "SOCKPROXY_TEST_KEY_NOT_BASE64";
        std::env::set_var(name, "%%% not base64 %%%");
        let err = decode_base64_env(name).unwrap_err();
        std::env::remove_var(name);

        assert!(matches!(err, CredentialError::Base64 { .. }));
    }

    #[test]
    fn missing_files_are_read_errors() {
        let err = load_trusted_issuers(Path::new("/nonexistent/ca.crt")).unwrap_err();
        assert!(matches!(err, CredentialError::Read { kind: "client CA bundle", .. }));
    }

    #[test]
    fn load_credentials_requires_key_source() {
        let config = TlsConfig {
            key_env: None,
            ..TlsConfig::default()
        };
        assert!(matches!(
            load_credentials(&config).unwrap_err(),
            CredentialError::NoKeySource
        ));
    }
}
