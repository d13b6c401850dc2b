//! Configuration Module

pub mod types;

pub use types::{Config, GeneralConfig, LocalConfig, RelayConfig, RemoteConfig};
