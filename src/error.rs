//! Error taxonomy for the tunnel
//!
//! Negotiation errors are fatal to a single session only. Relay errors are
//! fatal to a single direction only and are logged rather than raised.
//! Teardown errors are always swallowed by the owning component.

use thiserror::Error;

use crate::envelope::DecryptError;

/// Session-fatal errors raised during SOCKS5 negotiation or the
/// inter-hop handshake.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Malformed or unsupported SOCKS5 framing (bad version, unsupported
    /// address type, unsupported auth method).
    #[error("socks5 protocol violation: {0}")]
    Protocol(String),

    /// Credential mismatch during the username/password sub-negotiation.
    /// Raised only after the failure status byte has been sent.
    #[error("socks5 authentication rejected")]
    Authentication,

    /// The remote hop could not establish the real outbound connection
    /// and answered with a zeroed bind tuple.
    #[error("remote relay could not reach the target")]
    RemoteRelay,

    /// The inter-hop envelope failed to decrypt, parse, or pass the
    /// freshness check. Treated as a trust-boundary violation.
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
}
