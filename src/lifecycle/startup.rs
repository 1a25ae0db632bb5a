//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the bind address
//! - Load credentials and build the TLS acceptor
//! - Bind the listener
//! - Run the accept loop, then drain live sessions
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::{SessionHandler, UnixDialer};
use crate::config::{ConfigError, ProxyConfig};
use crate::lifecycle::Shutdown;
use crate::net::{
    resolve_bind_address, serve, AddrError, ConnectionTracker, Listener, ListenerError,
};
use crate::resilience::AcceptBackoff;
use crate::tls::{build_acceptor, load_credentials, CredentialError};

/// How long aborted sessions get to finish closing before we stop waiting.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Fatal errors that stop the proxy.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("bind address: {0}")]
    Address(#[from] AddrError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A proxy that is bound and ready to accept.
pub struct Proxy {
    listener: Listener,
    handler: Arc<SessionHandler<UnixDialer>>,
    backoff: AcceptBackoff,
    drain_timeout: Duration,
}

/// Initialize everything up to and including the bind.
///
/// Relays started by the returned proxy observe `shutdown`'s session token.
pub async fn prepare(config: &ProxyConfig, shutdown: &Shutdown) -> Result<Proxy, StartupError> {
    let address = resolve_bind_address(&config.listener.bind_address)?;
    if address != config.listener.bind_address {
        tracing::info!(
            configured = %config.listener.bind_address,
            resolved = %address,
            "Resolved bind address"
        );
    }

    let credentials = load_credentials(&config.tls)?;
    let acceptor = build_acceptor(credentials)?;

    let listener = Listener::bind(&address).await?;

    let dialer = UnixDialer::new(&config.backend.socket_path);
    let handler = SessionHandler::from_config(acceptor, dialer, config)
        .with_tracker(ConnectionTracker::new())
        .with_cancel(shutdown.session_token());

    tracing::info!(backend = %config.backend.socket_path.display(), "Serving backend");

    Ok(Proxy {
        listener,
        handler: Arc::new(handler),
        backoff: AcceptBackoff::from_millis(config.listener.accept_backoff_ms),
        drain_timeout: Duration::from_secs(config.shutdown.drain_timeout_secs),
    })
}

impl Proxy {
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Live session count.
    pub fn active_sessions(&self) -> u64 {
        self.handler.tracker().active_count()
    }

    /// Accept until shutdown, then drain live sessions.
    ///
    /// A fatal accept error also drains before it is returned.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), StartupError> {
        let handler = Arc::clone(&self.handler);
        let served = serve(
            &shutdown.listener_token(),
            self.listener,
            self.backoff,
            move |stream, peer_addr| {
                let handler = Arc::clone(&handler);
                async move {
                    handler.handle(stream, peer_addr).await;
                }
            },
        )
        .await;

        drain(self.handler.tracker(), shutdown, self.drain_timeout).await;
        served.map_err(StartupError::from)
    }
}

/// Start the proxy and run it until shutdown.
pub async fn run(config: &ProxyConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    prepare(config, &shutdown).await?.run(&shutdown).await
}

async fn drain(tracker: &ConnectionTracker, shutdown: &Shutdown, timeout: Duration) {
    let active = tracker.active_count();
    if active == 0 {
        return;
    }

    tracing::info!(active, timeout = ?timeout, "Draining sessions");
    if tracker.wait_idle(timeout).await {
        tracing::info!("All sessions drained");
        return;
    }

    tracing::warn!(remaining = tracker.active_count(), "Drain timeout elapsed; aborting sessions");
    shutdown.abort_sessions();
    if !tracker.wait_idle(ABORT_GRACE).await {
        tracing::warn!(remaining = tracker.active_count(), "Sessions still open after abort");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_fail_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.tls.cert_path = dir.path().join("absent.crt");
        config.tls.key_path = Some(dir.path().join("absent.key"));
        config.tls.key_env = None;

        let err = prepare(&config, &Shutdown::new()).await.err().unwrap();
        assert!(matches!(err, StartupError::Credentials(_)));
    }

    #[tokio::test]
    async fn address_is_resolved_before_credentials_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "192.0.2.0/30:4431".to_string();
        config.tls.cert_path = dir.path().join("absent.crt");
        config.tls.key_path = Some(dir.path().join("absent.key"));

        let err = prepare(&config, &Shutdown::new()).await.err().unwrap();
        assert!(matches!(err, StartupError::Address(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_after_timeout() {
        let tracker = ConnectionTracker::new();
        let shutdown = Shutdown::new();
        let guard = tracker.track();

        let sessions = shutdown.session_token();
        let session = tokio::spawn(async move {
            sessions.cancelled().await;
            drop(guard);
        });

        drain(&tracker, &shutdown, Duration::from_secs(10)).await;
        assert!(shutdown.session_token().is_cancelled());
        assert_eq!(tracker.active_count(), 0);
        session.await.unwrap();
    }

    #[tokio::test]
    async fn drain_without_sessions_leaves_them_alone() {
        let shutdown = Shutdown::new();
        drain(&ConnectionTracker::new(), &shutdown, Duration::from_secs(10)).await;
        assert!(!shutdown.session_token().is_cancelled());
    }
}
