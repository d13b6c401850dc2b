//! Data Relay Module
//!
//! The bidirectional byte pump both hops hand their stream pairs to once
//! negotiation succeeds.

pub mod engine;

pub use engine::RelayEngine;
