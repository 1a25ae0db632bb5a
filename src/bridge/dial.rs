//! Backend connection establishment.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;

/// Opens the Target Connection for an authorized session.
///
/// Called at most once per session and never retried.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Human readable target for log lines.
    fn target(&self) -> String;
}

/// Dials a Unix domain socket, e.g. `/var/run/docker.sock`.
#[derive(Debug, Clone)]
pub struct UnixDialer {
    path: PathBuf,
}

impl UnixDialer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Dialer for UnixDialer {
    type Stream = UnixStream;

    async fn dial(&self) -> io::Result<UnixStream> {
        UnixStream::connect(&self.path).await
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}
