//! Fixed backoff after transient accept errors.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause inserted after a transient accept error so a degraded listener
/// (e.g. out of file descriptors) does not spin the accept loop.
///
/// The delay is constant; there is no exponential growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptBackoff {
    delay: Duration,
}

impl AcceptBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the backoff delay. Returns `false` if `cancel` fired first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_one_second() {
        assert_eq!(AcceptBackoff::default().delay(), Duration::from_secs(1));
        assert_eq!(AcceptBackoff::from_millis(250).delay(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_full_delay() {
        let backoff = AcceptBackoff::from_millis(1000);
        let cancel = CancellationToken::new();

        let start = tokio::time::Instant::now();
        assert!(backoff.wait(&cancel).await);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn cancellation_cuts_the_wait_short() {
        let backoff = AcceptBackoff::from_millis(60_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let completed = tokio::time::timeout(Duration::from_secs(1), backoff.wait(&cancel))
            .await
            .expect("backoff ignored cancellation");
        assert!(!completed);
    }
}
