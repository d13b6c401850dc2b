//! Remote Relay Module
//!
//! The destination-facing hop: accepts the encrypted negotiation
//! envelope, opens the real outbound connection, reports the bind tuple
//! back, then pumps bytes.

pub mod server;

pub use server::RemoteRelay;
