//! Shutdown coordination for the proxy.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Two tokens: `listener` stops the accept loop, `sessions` tears down
/// live relays. They fire independently so sessions can drain after the
/// listener has stopped. Aborting sessions also stops the listener.
#[derive(Debug, Clone)]
pub struct Shutdown {
    listener: CancellationToken,
    sessions: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            listener: CancellationToken::new(),
            sessions: CancellationToken::new(),
        }
    }

    /// Token observed by the accept loop.
    pub fn listener_token(&self) -> CancellationToken {
        self.listener.clone()
    }

    /// Token observed by every relay.
    pub fn session_token(&self) -> CancellationToken {
        self.sessions.clone()
    }

    /// Stop accepting new connections. Live sessions continue.
    pub fn trigger(&self) {
        self.listener.cancel();
    }

    /// Tear down every live session.
    pub fn abort_sessions(&self) {
        self.listener.cancel();
        self.sessions.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.listener.is_cancelled()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
