//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop:
//!     → transient accept error → backoff.rs (fixed pause, cancellable)
//!
//! Session:
//!     → timeouts.rs (bound handshake and backend dial)
//! ```
//!
//! # Design Decisions
//! - Nothing inside a session is retried; a failed dial ends the session
//! - The accept backoff is a fixed delay, not exponential
//! - Timeout errors are distinct from other errors

pub mod backoff;
pub mod timeouts;

pub use backoff::AcceptBackoff;
pub use timeouts::{with_timeout, TimeoutError};
