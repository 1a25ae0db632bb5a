//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Credentials → Resolve bind address → Bind → Accept loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain sessions → Abort the rest → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second SIGTERM/SIGINT → Abort live sessions
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then credentials, then the listener
//! - Ordered shutdown: stop accept, drain, close
//! - Draining has a timeout: remaining sessions are aborted after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{prepare, run, Proxy, StartupError};
