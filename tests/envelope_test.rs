//! Tests for the secure envelope

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};

use ruxy::envelope::crypto::Crypto;
use ruxy::envelope::{BindResult, DecryptError, Envelope, SymmetricKey, TargetDescriptor, PAD_UNIT};

const KEY: &str = "1b94f71484d0488681ef7c9a625a2069";

fn key() -> SymmetricKey {
    SymmetricKey::new(KEY).unwrap()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Encrypt a handcrafted wire record, bypassing `Envelope::new`, so the
/// timestamp can be forged.
fn seal_raw(timestamp: i64) -> Vec<u8> {
    let record = json!({
        "uuid": "cafebabe",
        "key": KEY,
        "payload": {"ip": "", "domain": "example.test", "port": 80},
        "timestamp": timestamp,
    });
    Crypto::new(&key()).encrypt(&serde_json::to_vec(&record).unwrap())
}

#[test]
fn key_must_be_exactly_32_bytes() {
    assert!(SymmetricKey::new(KEY).is_ok());
    assert!(SymmetricKey::new("").is_err());
    assert!(SymmetricKey::new("short").is_err());
    assert!(SymmetricKey::new(&"x".repeat(33)).is_err());
    // Multi-byte UTF-8 counts in bytes, not chars.
    assert!(SymmetricKey::new(&"é".repeat(16)).is_ok());
}

#[test]
fn round_trip_preserves_all_four_fields() {
    let key = key();
    let mut payload = Map::new();
    payload.insert("ip".into(), Value::from("93.184.216.34"));
    payload.insert("domain".into(), Value::from(""));
    payload.insert("port".into(), Value::from(443u16));

    let envelope = Envelope::new(&key, payload.clone());
    let opened = Envelope::open(&key, &envelope.seal(&key)).unwrap();

    assert_eq!(opened.id(), envelope.id());
    assert_eq!(opened.echoed_key(), KEY);
    assert_eq!(opened.payload(), &payload);
    assert_eq!(opened.timestamp(), envelope.timestamp());
}

#[test]
fn ciphertext_is_padded_to_the_32_byte_unit() {
    let key = key();
    for payload_size in [0usize, 1, 10, 100] {
        let mut payload = Map::new();
        payload.insert("filler".into(), Value::from("x".repeat(payload_size)));
        let ct = Envelope::new(&key, payload).seal(&key);
        assert_eq!(ct.len() % PAD_UNIT, 0, "payload_size={payload_size}");
        assert!(!ct.is_empty());
    }
}

#[test]
fn future_skew_of_ten_seconds_is_stale() {
    let key = key();
    let stale = seal_raw(unix_now() + 11);
    assert_eq!(
        Envelope::open(&key, &stale).unwrap_err(),
        DecryptError::Stale
    );

    let fresh = seal_raw(unix_now() + 5);
    assert!(Envelope::open(&key, &fresh).is_ok());
}

#[test]
fn past_skew_is_accepted() {
    // Replayed old envelopes pass the asymmetric freshness check; the
    // receiver only rejects far-future timestamps.
    let key = key();
    let old = seal_raw(unix_now() - 3600);
    assert!(Envelope::open(&key, &old).is_ok());
}

#[test]
fn any_flipped_bit_fails_closed() {
    let key = key();
    let envelope = Envelope::new(&key, TargetDescriptor::from_domain("example.test".into(), 80).to_payload());
    let sealed = envelope.seal(&key);

    for index in [0, sealed.len() / 2, sealed.len() - 1] {
        for bit in [0u8, 3, 7] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 1 << bit;
            assert!(
                Envelope::open(&key, &tampered).is_err(),
                "flip at byte {index} bit {bit} was accepted"
            );
        }
    }
}

#[test]
fn wrong_key_fails_closed() {
    let sealed = Envelope::new(&key(), Map::new()).seal(&key());
    let other = SymmetricKey::new("00000000000000000000000000000000").unwrap();
    assert!(Envelope::open(&other, &sealed).is_err());
}

#[test]
fn truncated_and_empty_ciphertexts_are_rejected() {
    let key = key();
    assert_eq!(
        Envelope::open(&key, &[]).unwrap_err(),
        DecryptError::BadLength
    );
    assert_eq!(
        Envelope::open(&key, &[0u8; PAD_UNIT - 1]).unwrap_err(),
        DecryptError::BadLength
    );

    let sealed = Envelope::new(&key, Map::new()).seal(&key);
    assert!(Envelope::open(&key, &sealed[..sealed.len() - PAD_UNIT]).is_err());
}

#[test]
fn missing_fields_are_malformed() {
    let key = key();
    let record = json!({"uuid": "cafebabe", "payload": {}});
    let ct = Crypto::new(&key).encrypt(&serde_json::to_vec(&record).unwrap());
    assert_eq!(
        Envelope::open(&key, &ct).unwrap_err(),
        DecryptError::Malformed
    );
}

#[test]
fn target_descriptor_payload_round_trip() {
    let target = TargetDescriptor::from_domain("example.test".into(), 80);
    let rebuilt = TargetDescriptor::from_payload(&target.to_payload()).unwrap();
    assert_eq!(rebuilt, target);
    assert_eq!(rebuilt.ip, "");
    assert_eq!(rebuilt.domain, "example.test");
    assert_eq!(rebuilt.port, 80);
    assert!(!rebuilt.is_empty());

    let empty = TargetDescriptor::from_payload(&Map::new());
    assert!(empty.is_err());
}

#[test]
fn bind_result_failure_sentinel() {
    let failure = BindResult::failure();
    assert!(failure.is_failure());
    assert!(BindResult::new("".into(), 80).is_failure());
    assert!(BindResult::new("10.0.0.1".into(), 0).is_failure());

    let ok = BindResult::new("10.0.0.1".into(), 4242);
    assert!(!ok.is_failure());
    assert_eq!(ok.ipv4().unwrap().octets(), [10, 0, 0, 1]);
    assert_eq!(BindResult::from_payload(&ok.to_payload()).unwrap(), ok);
}
