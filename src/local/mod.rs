//! Local Broker Module
//!
//! The client-facing hop: terminates SOCKS5, negotiates the real
//! destination with the remote relay, then pumps bytes.

pub mod broker;
pub mod upstream;

pub use broker::LocalBroker;
pub use upstream::Upstream;
