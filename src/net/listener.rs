//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Bind to the resolved address
//! - Accept incoming TCP connections and hand each to its own task
//! - Pause and retry on transient accept errors
//! - Stop accepting when shutdown is requested
//!
//! # Design Decisions
//! - The loop is generic over [`Accept`] so it can run against a scripted source
//! - A slow or stalled session never delays the next accept
//! - Any accept error not classified as transient ends the loop

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use nix::libc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::resilience::AcceptBackoff;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind { address: String, source: io::Error },
    /// Accept failed with an error that is not worth retrying.
    Accept(io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind { address, source } => {
                write!(f, "Failed to bind {}: {}", address, source)
            }
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } => Some(source),
            ListenerError::Accept(e) => Some(e),
        }
    }
}

/// A source of accepted connections.
pub trait Accept: Send {
    type Conn: Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Conn, SocketAddr)>> + Send;
}

/// A bound TCP listener.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to `address` (`host:port`, already resolved).
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };

        let inner = TcpListener::bind(address).await.map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Accept for Listener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await
    }
}

/// Whether an accept error should be retried after a pause.
///
/// Covers peers that vanished mid-accept and temporary resource exhaustion.
pub fn is_transient_accept_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM | libc::EPROTO)
    )
}

/// Run the accept loop until `shutdown` fires or a fatal accept error occurs.
///
/// ```text
/// Accepting ──ok──────────→ spawn session → Accepting
///     │      ──transient──→ BackingOff ──delay──→ Accepting
///     │      ──fatal──────→ Stopped (Err)
///     └──────shutdown─────→ Stopped (Ok)
/// ```
///
/// Shutdown is observed between accepts and during the backoff pause.
/// Sessions already spawned are not waited for.
pub async fn serve<L, F, Fut>(
    shutdown: &CancellationToken,
    mut listener: L,
    backoff: AcceptBackoff,
    session: F,
) -> Result<(), ListenerError>
where
    L: Accept,
    F: Fn(L::Conn, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((conn, peer_addr)) => {
                tracing::debug!(%peer_addr, "Connection accepted");
                tokio::spawn(session(conn, peer_addr));
            }
            Err(e) if is_transient_accept_error(&e) => {
                tracing::warn!(error = %e, delay = ?backoff.delay(), "Accept failed; retrying");
                if !backoff.wait(shutdown).await {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Accept failed; stopping listener");
                return Err(ListenerError::Accept(e));
            }
        }
    }

    tracing::info!("Listener stopped accepting");
    Ok(())
}
