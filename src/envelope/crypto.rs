//! Block cipher for the envelope
//!
//! AES-256 in electronic-codebook style: every 16-byte block is encrypted
//! independently, with no chaining and no IV. The wire format pins this
//! construction; it lives behind this module so it can be swapped for an
//! AEAD without touching negotiation logic. Identical plaintext blocks
//! produce identical ciphertext blocks; trust still derives only from a
//! successful decrypt of the whole blob.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;

use super::block::{DecryptError, SymmetricKey};

/// Padding unit in bytes. Deliberately twice the AES block size; the wire
/// format breaks if this is changed.
pub const PAD_UNIT: usize = 32;

const AES_BLOCK: usize = 16;

/// Stateless cipher handle bound to one symmetric key.
pub struct Crypto {
    cipher: Aes256,
}

impl Crypto {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(key.bytes())),
        }
    }

    /// Pad the plaintext to the pad unit and encrypt it. Never fails.
    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        let mut buf = pad(plain);
        for block in buf.chunks_exact_mut(AES_BLOCK) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        buf
    }

    /// Decrypt and strip padding. The only failure mode is [`DecryptError`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if ciphertext.is_empty() || ciphertext.len() % PAD_UNIT != 0 {
            return Err(DecryptError::BadLength);
        }
        let mut buf = ciphertext.to_vec();
        for block in buf.chunks_exact_mut(AES_BLOCK) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        unpad(&mut buf)?;
        Ok(buf)
    }
}

/// PKCS#7-style padding over the 32-byte unit. Always appends at least one
/// byte; input already on the boundary gains a full pad block.
fn pad(plain: &[u8]) -> Vec<u8> {
    let fill = PAD_UNIT - plain.len() % PAD_UNIT;
    let mut buf = Vec::with_capacity(plain.len() + fill);
    buf.extend_from_slice(plain);
    buf.resize(plain.len() + fill, fill as u8);
    buf
}

fn unpad(buf: &mut Vec<u8>) -> Result<(), DecryptError> {
    let fill = *buf.last().ok_or(DecryptError::BadPadding)? as usize;
    if fill == 0 || fill > PAD_UNIT || fill > buf.len() {
        return Err(DecryptError::BadPadding);
    }
    if !buf[buf.len() - fill..].iter().all(|&b| b as usize == fill) {
        return Err(DecryptError::BadPadding);
    }
    buf.truncate(buf.len() - fill);
    Ok(())
}
