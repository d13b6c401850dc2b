//! Typed views of the envelope payload map
//!
//! The request direction carries `{ip, domain, port}`, the response
//! direction `{bindAddress, bindPort}`. Absent addresses travel as empty
//! strings, never as missing fields.

use std::net::Ipv4Addr;

use anyhow::anyhow;
use serde_json::{Map, Value};

use crate::Result;

/// The destination the SOCKS5 client asked for. Exactly one of `ip` /
/// `domain` is populated; both empty is a protocol error on the remote hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub ip: String,
    pub domain: String,
    pub port: u16,
}

impl TargetDescriptor {
    pub fn from_ipv4(addr: Ipv4Addr, port: u16) -> Self {
        Self {
            ip: addr.to_string(),
            domain: String::new(),
            port,
        }
    }

    pub fn from_domain(domain: String, port: u16) -> Self {
        Self {
            ip: String::new(),
            domain,
            port,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ip.is_empty() && self.domain.is_empty()
    }

    pub fn to_payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("ip".into(), Value::from(self.ip.clone()));
        map.insert("domain".into(), Value::from(self.domain.clone()));
        map.insert("port".into(), Value::from(self.port));
        map
    }

    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            ip: get_string(payload, "ip")?,
            domain: get_string(payload, "domain")?,
            port: get_port(payload, "port")?,
        })
    }
}

impl std::fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}:{}", self.ip, self.domain, self.port)
    }
}

/// The bind tuple the remote hop reports back once (and whether) the real
/// outbound connection succeeded. `{"", 0}` signals failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResult {
    pub address: String,
    pub port: u16,
}

impl BindResult {
    pub fn new(address: String, port: u16) -> Self {
        Self { address, port }
    }

    pub fn failure() -> Self {
        Self {
            address: String::new(),
            port: 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.address.is_empty() || self.port == 0
    }

    pub fn ipv4(&self) -> Result<Ipv4Addr> {
        self.address
            .parse()
            .map_err(|_| anyhow!("bind address is not IPv4: {:?}", self.address))
    }

    pub fn to_payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("bindAddress".into(), Value::from(self.address.clone()));
        map.insert("bindPort".into(), Value::from(self.port));
        map
    }

    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            address: get_string(payload, "bindAddress")?,
            port: get_port(payload, "bindPort")?,
        })
    }
}

fn get_string(payload: &Map<String, Value>, field: &str) -> Result<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("envelope payload missing string field {:?}", field))
}

fn get_port(payload: &Map<String, Value>, field: &str) -> Result<u16> {
    let raw = payload
        .get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("envelope payload missing numeric field {:?}", field))?;
    u16::try_from(raw).map_err(|_| anyhow!("envelope field {:?} out of port range: {}", field, raw))
}
