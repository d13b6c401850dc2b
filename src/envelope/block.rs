//! Envelope construction and the shared key

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::crypto::Crypto;

/// Maximum tolerated future skew of a sender timestamp, in seconds.
/// Envelopes claiming a timestamp this far ahead of the receiver's clock
/// are rejected as stale or clock-skewed. Past-skewed envelopes pass;
/// only the future direction is checked and the asymmetry is part of
/// the wire contract.
const MAX_FUTURE_SKEW_SECS: i64 = 10;

/// The shared 32-byte symmetric secret, derived from a configured UTF-8
/// string. Loaded once at process start and immutable afterwards. The
/// string form is retained because the wire format echoes it inside the
/// encrypted payload.
#[derive(Clone)]
pub struct SymmetricKey {
    string: String,
    bytes: [u8; 32],
}

impl SymmetricKey {
    /// Derive the key from its configured string form. Any string that
    /// does not encode to exactly 32 bytes is a configuration error.
    pub fn new(key: &str) -> crate::Result<Self> {
        let raw = key.as_bytes();
        let bytes: [u8; 32] = raw.try_into().map_err(|_| {
            anyhow::anyhow!("key must encode to exactly 32 bytes, got {}", raw.len())
        })?;
        Ok(Self {
            string: key.to_owned(),
            bytes,
        })
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The key's original string form, embedded in every envelope.
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SymmetricKey(..)")
    }
}

/// Decrypt failures. The only error kind [`Envelope::open`] returns, so
/// callers can match on exactly one thing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("ciphertext length is not a nonzero multiple of the pad unit")]
    BadLength,
    #[error("malformed padding")]
    BadPadding,
    #[error("decrypted envelope is not a valid negotiation record")]
    Malformed,
    #[error("stale or clock-skewed envelope")]
    Stale,
}

/// The signed/encrypted negotiation record exchanged between hops.
///
/// Immutable once constructed; a fresh envelope is built per handshake
/// attempt and the ciphertext is derived on demand from the fields, so
/// there is no cached blob to go stale.
///
/// The serde renames pin the JSON keys of the wire format.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "uuid")]
    id: String,
    /// The shared key's string form, echoed inside the very payload that
    /// key encrypts. Redundant and security-neutral; carried for wire
    /// compatibility only and never consulted for trust decisions.
    #[serde(rename = "key")]
    echoed_key: String,
    payload: Map<String, Value>,
    timestamp: i64,
}

impl Envelope {
    /// Build a fresh envelope around a payload map. The id is a random
    /// token, unique per instance and purely informational.
    pub fn new(key: &SymmetricKey, payload: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            echoed_key: key.as_str().to_owned(),
            payload,
            timestamp: unix_now(),
        }
    }

    /// Serialize-then-encrypt into one atomic blob. Never fails for
    /// payload maps holding only strings and numbers.
    pub fn seal(&self, key: &SymmetricKey) -> Vec<u8> {
        let plain = serde_json::to_vec(self).expect("envelope serialization is infallible");
        Crypto::new(key).encrypt(&plain)
    }

    /// Decrypt, unpad, and parse a received blob, then enforce freshness:
    /// a sender timestamp at least 10 seconds ahead of the local clock is
    /// rejected. Fails only with [`DecryptError`].
    pub fn open(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Self, DecryptError> {
        let plain = Crypto::new(key).decrypt(ciphertext)?;
        let envelope: Envelope =
            serde_json::from_slice(&plain).map_err(|_| DecryptError::Malformed)?;
        if envelope.timestamp - unix_now() >= MAX_FUTURE_SKEW_SECS {
            return Err(DecryptError::Stale);
        }
        Ok(envelope)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The echoed key string. Carried for wire compatibility; callers
    /// must not base trust decisions on it.
    pub fn echoed_key(&self) -> &str {
        &self.echoed_key
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

fn unix_now() -> i64 {
    // A clock before the epoch maps to 0 rather than panicking; such an
    // envelope is simply very past-skewed, which the check accepts.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
