//! Configuration Types

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Main configuration structure, loaded from one TOML file shared in
/// shape by both hops; each hop reads the sections it needs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub relay: RelayConfig,
}

/// Settings shared by both hops
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Shared symmetric key material: a UTF-8 string that must encode to
    /// exactly 32 bytes. Distributed out-of-band, never transmitted.
    pub key: String,
}

/// SOCKS5 front end and its view of the remote relay
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    pub listen_addr: SocketAddr,
    pub username: String,
    pub password: String,
    /// Listen backlog; the only admission control the broker applies.
    pub backlog: u32,
    pub remote_host: String,
    pub remote_port: u16,
    /// TLS-wrap the envelope transport towards the remote relay.
    pub tls: bool,
    /// Extra trust anchor for self-signed relay certificates.
    pub ca_file: Option<PathBuf>,
}

/// Remote relay listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteConfig {
    pub listen_addr: SocketAddr,
    pub backlog: u32,
    pub tls: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

/// Relay engine tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Maximum wait for new data on a pump loop before the direction is
    /// treated as abandoned.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the loaded values; failures name the offending field.
    pub fn validate(&self) -> Result<()> {
        let key_len = self.general.key.as_bytes().len();
        if key_len != 32 {
            return Err(anyhow!(
                "general.key must encode to exactly 32 bytes, got {key_len}"
            ));
        }
        if self.local.backlog == 0 || self.remote.backlog == 0 {
            return Err(anyhow!("backlog must be nonzero"));
        }
        if self.local.remote_host.is_empty() {
            return Err(anyhow!("local.remote_host must not be empty"));
        }
        if self.remote.tls && (self.remote.cert_file.is_none() || self.remote.key_file.is_none()) {
            return Err(anyhow!(
                "remote.cert_file and remote.key_file are required when remote.tls is enabled"
            ));
        }
        if self.relay.idle_timeout.is_zero() {
            return Err(anyhow!("relay.idle_timeout must be nonzero"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                key: "00000000000000000000000000000000".to_string(),
            },
            local: LocalConfig {
                listen_addr: "127.0.0.1:9011".parse().unwrap(),
                username: "username".to_string(),
                password: "password".to_string(),
                backlog: 128,
                remote_host: "localhost".to_string(),
                remote_port: 9190,
                tls: false,
                ca_file: None,
            },
            remote: RemoteConfig {
                listen_addr: "127.0.0.1:9190".parse().unwrap(),
                backlog: 128,
                tls: false,
                cert_file: None,
                key_file: None,
            },
            relay: RelayConfig {
                idle_timeout: Duration::from_secs(15),
            },
        }
    }
}
