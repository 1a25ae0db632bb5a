//! TLS to Unix socket bridge.
//!
//! # Data Flow
//! ```text
//! accepted TCP stream
//!     → session.rs (TLS handshake, one client certificate required)
//!     → dial.rs (connect to the backend socket, once)
//!     → relay.rs (copy both directions until either side ends)
//!     → both connections closed
//! ```
//!
//! # Design Decisions
//! - One task per session; the relay joins both directions inside it
//! - Authorization is decided by the TLS layer's chain check plus a
//!   certificate count; there is no allow-list
//! - The backend is only dialed after authorization succeeds

pub mod dial;
pub mod relay;
pub mod session;

pub use dial::{Dialer, UnixDialer};
pub use relay::{DirectionEnd, DirectionOutcome, Interruption, Relay, RelayOutcome};
pub use session::{SessionHandler, SessionOutcome, StepError};
