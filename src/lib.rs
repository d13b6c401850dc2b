//! ruxy library
//!
//! A two-hop SOCKS5 tunnel. The local broker terminates SOCKS5 from the
//! application client and negotiates the real destination with the remote
//! relay over an encrypted side channel; the remote relay opens the real
//! outbound connection and both hops then pump bytes through the shared
//! relay engine.

pub mod config;
pub mod envelope;
pub mod error;
pub mod local;
pub mod protocol;
pub mod relay;
pub mod remote;
pub mod transport;

pub use config::Config;
pub use error::TunnelError;
pub use local::LocalBroker;
pub use remote::RemoteRelay;

/// Common error type for the tunnel
pub type Result<T> = anyhow::Result<T>;
