//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::{TcpStream, UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;

use sockproxy::bridge::{Dialer, SessionHandler, SessionOutcome, UnixDialer};
use sockproxy::config::TlsConfig;
use sockproxy::net::{serve, Listener};
use sockproxy::resilience::AcceptBackoff;
use sockproxy::tls::{
    build_acceptor, parse_certificates, parse_private_key, trusted_issuers_from_pem, Credentials,
    ServerIdentity,
};

/// A client certificate and its key.
pub struct ClientIdentity {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivatePkcs8KeyDer<'static>,
}

impl ClientIdentity {
    /// The same identity with the issuing CA appended, so two certificates are presented.
    pub fn with_extra(&self, extra: CertificateDer<'static>) -> ClientIdentity {
        let mut chain = self.chain.clone();
        chain.push(extra);
        ClientIdentity {
            chain,
            key: self.key.clone_key(),
        }
    }
}

/// A throwaway PKI: one CA issuing both the server and client certificates.
pub struct TestPki {
    pub ca_pem: String,
    pub ca_der: CertificateDer<'static>,
    pub server_cert_pem: String,
    pub server_key_pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl TestPki {
    pub fn generate() -> Self {
        let (ca_pem, ca_der, issuer) = new_ca("Test Clients CA");

        let server_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "sockproxy test server");
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = params.signed_by(&server_key, &issuer).unwrap();

        Self {
            ca_pem,
            ca_der,
            server_cert_pem: server_cert.pem(),
            server_key_pem: server_key.serialize_pem(),
            issuer,
        }
    }

    /// Issue a client certificate signed by this PKI's CA.
    pub fn client(&self, cn: &str) -> ClientIdentity {
        issue_client(cn, &self.issuer)
    }

    /// A client certificate from an unrelated CA.
    pub fn rogue_client(&self, cn: &str) -> ClientIdentity {
        let (_, _, rogue) = new_ca("Rogue CA");
        issue_client(cn, &rogue)
    }

    pub fn credentials(&self) -> Credentials {
        let cert_chain =
            parse_certificates(self.server_cert_pem.as_bytes(), "test server cert").unwrap();
        let key = parse_private_key(self.server_key_pem.as_bytes(), "test server key").unwrap();
        let issuers = trusted_issuers_from_pem(self.ca_pem.as_bytes(), "test CA").unwrap();
        Credentials {
            identity: ServerIdentity { cert_chain, key },
            issuers,
        }
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        build_acceptor(self.credentials()).unwrap()
    }

    /// Client connector trusting this PKI's CA, presenting `identity` if given.
    pub fn connector(&self, identity: Option<&ClientIdentity>) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_der.clone()).unwrap();

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots);

        let config = match identity {
            Some(id) => builder
                .with_client_auth_cert(id.chain.clone(), PrivateKeyDer::Pkcs8(id.key.clone_key()))
                .unwrap(),
            None => builder.with_no_client_auth(),
        };
        TlsConnector::from(Arc::new(config))
    }

    /// Write the server certificate and CA bundle into `dir` and describe them.
    /// The key goes to a file unless `key_env` is given.
    pub fn write_files(&self, dir: &Path, key_env: Option<&str>) -> TlsConfig {
        let cert_path = dir.join("server.crt");
        let ca_path = dir.join("clients-ca.crt");
        std::fs::write(&cert_path, &self.server_cert_pem).unwrap();
        std::fs::write(&ca_path, &self.ca_pem).unwrap();

        let mut config = TlsConfig {
            cert_path,
            client_ca_path: ca_path,
            ..TlsConfig::default()
        };
        match key_env {
            Some(name) => {
                config.key_env = Some(name.to_string());
                config.key_path = None;
            }
            None => {
                let key_path = dir.join("server.key");
                std::fs::write(&key_path, &self.server_key_pem).unwrap();
                config.key_path = Some(key_path);
                config.key_env = None;
            }
        }
        config
    }
}

fn new_ca(cn: &str) -> (String, CertificateDer<'static>, Issuer<'static, KeyPair>) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), cert.der().clone(), Issuer::new(params, key))
}

fn issue_client(cn: &str, issuer: &Issuer<'static, KeyPair>) -> ClientIdentity {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let cert = params.signed_by(&key, issuer).unwrap();
    ClientIdentity {
        chain: vec![cert.der().clone()],
        key: PrivatePkcs8KeyDer::from(key.serialize_der()),
    }
}

/// Open a TLS connection to the proxy at `addr`.
pub async fn connect(
    addr: SocketAddr,
    connector: &TlsConnector,
) -> io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
}

/// Start a Unix socket backend at `dir/backend.sock` running `f` per connection.
pub fn spawn_backend<F, Fut>(dir: &Path, f: F) -> PathBuf
where
    F: Fn(UnixStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let path = dir.join("backend.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((conn, _)) = listener.accept().await {
            tokio::spawn(f(conn));
        }
    });
    path
}

/// Backend that echoes every byte until its peer closes.
pub fn spawn_echo_backend(dir: &Path) -> PathBuf {
    spawn_backend(dir, |conn| async move {
        let (mut rd, mut wr) = conn.into_split();
        let _ = tokio::io::copy(&mut rd, &mut wr).await;
    })
}

/// Dialer that counts how often it was asked to dial.
#[derive(Clone)]
pub struct CountingDialer {
    inner: UnixDialer,
    dials: Arc<AtomicUsize>,
}

impl CountingDialer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: UnixDialer::new(path),
            dials: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Dialer for CountingDialer {
    type Stream = UnixStream;

    async fn dial(&self) -> io::Result<UnixStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.inner.dial().await
    }

    fn target(&self) -> String {
        self.inner.target()
    }
}

/// A running accept loop whose session outcomes can be observed.
pub struct Harness {
    pub addr: SocketAddr,
    pub outcomes: mpsc::UnboundedReceiver<SessionOutcome>,
    pub shutdown: CancellationToken,
}

impl Harness {
    pub async fn start<D: Dialer>(handler: SessionHandler<D>) -> Self {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let handler = Arc::new(handler);
        let shutdown = CancellationToken::new();
        let (tx, outcomes) = mpsc::unbounded_channel();

        let token = shutdown.clone();
        tokio::spawn(async move {
            serve(&token, listener, AcceptBackoff::default(), move |stream, peer_addr| {
                let handler = Arc::clone(&handler);
                let tx = tx.clone();
                async move {
                    let _ = tx.send(handler.handle(stream, peer_addr).await);
                }
            })
            .await
        });

        Self {
            addr,
            outcomes,
            shutdown,
        }
    }

    /// Next finished session, failing the test after five seconds.
    pub async fn next_outcome(&mut self) -> SessionOutcome {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.outcomes.recv())
            .await
            .expect("no session finished in time")
            .expect("accept loop ended")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Collects formatted log lines from the current thread.
///
/// `#[tokio::test]` runs every task on one thread, so spawned sessions log here too.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
