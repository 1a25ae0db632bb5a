//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate signals to shutdown actions
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - First SIGTERM/SIGINT stops accepting and lets sessions drain
//! - A second one aborts live sessions immediately

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

struct Signals {
    terminate: Signal,
    interrupt: Signal,
}

impl Signals {
    fn register() -> io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
        }
    }
}

/// Register handlers now and drive `shutdown` from incoming signals.
pub fn spawn_signal_handler(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    let mut signals = Signals::register()?;

    Ok(tokio::spawn(async move {
        let name = signals.recv().await;
        tracing::info!(signal = name, "Shutdown requested; draining sessions");
        shutdown.trigger();

        let name = signals.recv().await;
        tracing::warn!(signal = name, "Second signal; aborting sessions");
        shutdown.abort_sessions();
    }))
}
