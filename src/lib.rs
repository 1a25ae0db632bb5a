//! Mutual-TLS front end for a local Unix domain socket.

pub mod bridge;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod tls;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
