//! Per-connection session handling.
//!
//! # Responsibilities
//! - Complete the TLS handshake with client authentication
//! - Require exactly one client certificate before touching the backend
//! - Dial the backend once and relay until either side is done
//!
//! Every exit path closes the client connection and, once dialed, the
//! backend connection. Nothing here is retried.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bridge::dial::Dialer;
use crate::bridge::relay::{Relay, RelayOutcome};
use crate::config::ProxyConfig;
use crate::net::ConnectionTracker;
use crate::resilience::{with_timeout, TimeoutError};
use crate::tls::{authorize_peer, AuthorizationError, PeerIdentity};

const CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// A handshake or dial step that failed or ran out of time.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

/// Which phase ended the session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// TLS handshake failed or timed out; nothing was dialed.
    HandshakeFailed(StepError),
    /// Handshake succeeded but the certificate count was wrong; nothing was dialed.
    Unauthorized(AuthorizationError),
    /// The backend could not be reached; no relay ran.
    DialFailed(StepError),
    /// The relay ran to completion.
    Completed(RelayOutcome),
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Short label for log fields.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::HandshakeFailed(_) => "handshake_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::DialFailed(_) => "dial_failed",
            Self::Completed(_) => "completed",
        }
    }
}

/// Drives one accepted connection from handshake to teardown.
///
/// Shared by all sessions; holds no per-session state.
pub struct SessionHandler<D> {
    acceptor: TlsAcceptor,
    dialer: D,
    relay: Relay,
    handshake_timeout: Duration,
    dial_timeout: Duration,
    tracker: ConnectionTracker,
    cancel: CancellationToken,
}

impl<D: Dialer> SessionHandler<D> {
    pub fn new(acceptor: TlsAcceptor, dialer: D) -> Self {
        Self::from_config(acceptor, dialer, &ProxyConfig::default())
    }

    pub fn from_config(acceptor: TlsAcceptor, dialer: D, config: &ProxyConfig) -> Self {
        Self {
            acceptor,
            dialer,
            relay: Relay::from_config(&config.relay),
            handshake_timeout: Duration::from_secs(config.tls.handshake_timeout_secs),
            dial_timeout: Duration::from_secs(config.backend.dial_timeout_secs),
            tracker: ConnectionTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Register live sessions with `tracker`.
    pub fn with_tracker(mut self, tracker: ConnectionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Cancelling `cancel` tears down every relay this handler is running.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_timeouts(mut self, handshake: Duration, dial: Duration) -> Self {
        self.handshake_timeout = handshake;
        self.dial_timeout = dial;
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Handle one accepted client connection until it is closed.
    pub async fn handle<S>(&self, stream: S, peer_addr: SocketAddr) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let guard = self.tracker.track();
        let span = tracing::info_span!("session", connection_id = %guard.id(), %peer_addr);

        async move {
            let outcome = self.run(stream).await;
            tracing::debug!(phase = outcome.phase(), "Session finished");
            drop(guard);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run<S>(&self, stream: S) -> SessionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let handshake = self.acceptor.accept(stream);
        let mut tls = match with_timeout("TLS handshake", self.handshake_timeout, handshake).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "TLS handshake failed");
                return SessionOutcome::HandshakeFailed(e.into());
            }
            Err(e) => {
                tracing::warn!(error = %e, "TLS handshake failed");
                return SessionOutcome::HandshakeFailed(e.into());
            }
        };

        let peer = match authorize_peer(tls.get_ref().1.peer_certificates()) {
            Ok(cert) => PeerIdentity::from_der(cert),
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected situation; closing connection");
                close_quietly(&mut tls).await;
                return SessionOutcome::Unauthorized(e);
            }
        };

        match &peer {
            Some(peer) => tracing::info!(
                subject = %peer.subject,
                issuer = %peer.issuer,
                serial = %peer.serial,
                "{} connected", peer
            ),
            None => tracing::info!("Client connected with an unparseable certificate"),
        }

        let target = self.dialer.target();
        tracing::info!(%target, "Dialing backend");

        let dial = self.dialer.dial();
        let backend = match with_timeout("backend dial", self.dial_timeout, dial).await {
            Ok(Ok(backend)) => {
                tracing::info!(%target, "Backend connected");
                backend
            }
            Ok(Err(e)) => {
                tracing::error!(%target, error = %e, "Backend dial failed");
                close_quietly(&mut tls).await;
                return SessionOutcome::DialFailed(e.into());
            }
            Err(e) => {
                tracing::error!(%target, error = %e, "Backend dial failed");
                close_quietly(&mut tls).await;
                return SessionOutcome::DialFailed(e.into());
            }
        };

        let outcome = self.relay.run(tls, backend, &self.cancel).await;

        let directions = [
            ("client→backend", &outcome.a_to_b),
            ("backend→client", &outcome.b_to_a),
        ];
        for (direction, side) in directions {
            if let Some(e) = side.error() {
                tracing::debug!(direction, error = %e, "Relay direction ended with error");
            }
        }
        tracing::info!(
            bytes_from_client = outcome.a_to_b.bytes,
            bytes_to_client = outcome.b_to_a.bytes,
            interrupted = ?outcome.interrupted,
            "Closing session"
        );

        SessionOutcome::Completed(outcome)
    }
}

/// Send close_notify before dropping, so the client sees an orderly close.
async fn close_quietly<W: AsyncWrite + Unpin>(stream: &mut W) {
    if let Ok(Err(e)) = tokio::time::timeout(CLOSE_NOTIFY_TIMEOUT, stream.shutdown()).await {
        tracing::trace!(error = %e, "Shutdown of client stream failed");
    }
}
