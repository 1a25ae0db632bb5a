//! Bidirectional byte relay with symmetric teardown.
//!
//! # Responsibilities
//! - Copy bytes `a → b` and `b → a` concurrently, unmodified and in order
//! - When either direction ends, stop the other and shut down both sides
//! - Return only after both directions finished, reporting how each ended
//!
//! # Design Decisions
//! - Both directions run inside the caller's task and are joined with
//!   `tokio::join!`; nothing is spawned, so nothing can outlive the call
//! - Errors are collected into [`RelayOutcome`], never raised: a peer hanging
//!   up is the normal way a session ends
//! - Shutting down an already closed stream is ignored

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;

/// Upper bound on flushing a close to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How one copy direction ended.
#[derive(Debug)]
pub enum DirectionEnd {
    /// The source reached end-of-stream.
    Eof,
    /// Reading from the source failed.
    ReadError(io::Error),
    /// Writing to the destination failed.
    WriteError(io::Error),
    /// The other direction ended first, or the relay was interrupted.
    Stopped,
}

/// Result of one copy direction.
#[derive(Debug)]
pub struct DirectionOutcome {
    /// Bytes written to the destination.
    pub bytes: u64,
    pub end: DirectionEnd,
}

impl DirectionOutcome {
    /// The I/O error that ended this direction, if any.
    pub fn error(&self) -> Option<&io::Error> {
        match &self.end {
            DirectionEnd::ReadError(e) | DirectionEnd::WriteError(e) => Some(e),
            DirectionEnd::Eof | DirectionEnd::Stopped => None,
        }
    }
}

/// Why a relay was ended from the outside rather than by one of its streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The cancellation token passed to [`Relay::run`] fired.
    Cancelled,
    /// No bytes moved in either direction for the idle timeout.
    IdleTimeout,
}

/// Result of a whole relay.
#[derive(Debug)]
pub struct RelayOutcome {
    pub a_to_b: DirectionOutcome,
    pub b_to_a: DirectionOutcome,
    pub interrupted: Option<Interruption>,
}

impl RelayOutcome {
    /// Whether either direction ended with an I/O error.
    pub fn has_errors(&self) -> bool {
        self.a_to_b.error().is_some() || self.b_to_a.error().is_some()
    }
}

/// Byte relay settings.
#[derive(Debug, Clone, Copy)]
pub struct Relay {
    buffer_size: usize,
    idle_timeout: Option<Duration>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl Relay {
    pub fn new(buffer_size: usize, idle_timeout: Option<Duration>) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            idle_timeout,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        let idle = (config.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(config.idle_timeout_secs));
        Self::new(config.buffer_size, idle)
    }

    /// Relay bytes between `a` and `b` until either side ends or `cancel` fires.
    ///
    /// Both streams are shut down and dropped before this returns.
    pub async fn run<A, B>(&self, a: A, b: B, cancel: &CancellationToken) -> RelayOutcome
    where
        A: AsyncRead + AsyncWrite + Send,
        B: AsyncRead + AsyncWrite + Send,
    {
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);

        let stop = cancel.child_token();
        let activity = Activity::new();

        let (a_to_b, b_to_a, idled) = tokio::join!(
            pump(a_read, b_write, self.buffer_size, &stop, &activity),
            pump(b_read, a_write, self.buffer_size, &stop, &activity),
            watch_idle(&activity, self.idle_timeout, &stop),
        );

        let interrupted = if cancel.is_cancelled() {
            Some(Interruption::Cancelled)
        } else if idled {
            Some(Interruption::IdleTimeout)
        } else {
            None
        };

        RelayOutcome { a_to_b, b_to_a, interrupted }
    }
}

/// Copy from `reader` to `writer` until end-of-stream, an error, or `stop`.
///
/// On exit, signals `stop` so the opposite direction ends too, then shuts
/// down `writer`.
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    stop: &CancellationToken,
    activity: &Activity,
) -> DirectionOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut bytes = 0u64;

    let end = loop {
        let n = tokio::select! {
            biased;
            _ = stop.cancelled() => break DirectionEnd::Stopped,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break DirectionEnd::Eof,
                Ok(n) => n,
                Err(e) => break DirectionEnd::ReadError(e),
            },
        };
        activity.touch();

        let written = tokio::select! {
            biased;
            _ = stop.cancelled() => break DirectionEnd::Stopped,
            written = write_chunk(&mut writer, &buf[..n]) => written,
        };
        if let Err(e) = written {
            break DirectionEnd::WriteError(e);
        }
        bytes += n as u64;
        activity.touch();
    };

    stop.cancel();

    match tokio::time::timeout(CLOSE_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(error = %e, "Ignoring shutdown error on closed stream"),
        Err(_) => tracing::trace!("Peer did not take the close in time"),
    }

    DirectionOutcome { bytes, end }
}

/// Write a whole chunk and push it past any buffering layer (e.g. TLS records).
async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}

/// Fire `stop` once nothing moved for `idle`. Returns whether it fired.
async fn watch_idle(activity: &Activity, idle: Option<Duration>, stop: &CancellationToken) -> bool {
    let Some(idle) = idle else {
        stop.cancelled().await;
        return false;
    };

    loop {
        let deadline = activity.last() + idle;
        tokio::select! {
            _ = stop.cancelled() => return false,
            _ = tokio::time::sleep_until(deadline) => {
                if activity.last() + idle <= Instant::now() {
                    stop.cancel();
                    return true;
                }
            }
        }
    }
}

/// Time of the last byte moved in either direction.
///
/// Shared by reference between the two directions and the idle watchdog,
/// which all run in the same task.
struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}
