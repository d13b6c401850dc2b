//! Secure Envelope Module
//!
//! The encrypted, timestamped negotiation message exchanged between the
//! two hops. An envelope is serialized to canonical JSON, padded to the
//! 32-byte pad unit, and encrypted as a single atomic blob; it decrypts
//! to exactly its four fields or fails closed with [`DecryptError`].

pub mod block;
pub mod crypto;
pub mod payload;

pub use block::{DecryptError, Envelope, SymmetricKey};
pub use crypto::PAD_UNIT;
pub use payload::{BindResult, TargetDescriptor};
