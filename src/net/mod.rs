//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured bind address ("host:port" or "prefix/len:port")
//!     → addr.rs (resolve a prefix to a local interface address)
//!     → listener.rs (bind, accept loop, transient error backoff)
//!     → connection.rs (per-session id and live count)
//!     → Hand off to the bridge
//!
//! Accept loop states:
//!     Accepting → BackingOff → Accepting … → Stopped
//! ```
//!
//! # Design Decisions
//! - No admission control: every accepted connection gets its own task
//! - Each session tracked for graceful shutdown
//! - Address resolution happens once, at startup

pub mod addr;
pub mod connection;
pub mod listener;

pub use addr::{resolve_bind_address, AddrError, IpPrefix};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{is_transient_accept_error, serve, Accept, Listener, ListenerError};
