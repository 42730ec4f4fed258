//! AES-256-GCM authenticated encryption.
//!
//! This module provides:
//! - [`encrypt`]: encrypt plaintext with a random nonce, returning [`SealedData`]
//! - [`decrypt`]: decrypt and authenticate [`SealedData`], returning [`SecretBuffer`]
//! - [`SealedData`]: nonce + ciphertext + tag container
//!
//! The cipher-backed encryptor frames every property value with this module,
//! so each value carries its own nonce and can be decrypted on its own.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum valid serialized length: nonce + empty ciphertext + tag.
const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Authenticated ciphertext container: nonce + ciphertext + tag.
///
/// Wire format: `nonce (12 bytes) || ciphertext (variable) || tag (16 bytes)`.
///
/// Any modification to the nonce, ciphertext, or tag makes decryption fail.
#[must_use = "encrypted data must be stored or transmitted"]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedData {
    /// 96-bit random nonce, unique per encryption.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted data (same length as original plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl SealedData {
    /// Serialize to wire format: `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = NONCE_LEN
            .saturating_add(self.ciphertext.len())
            .saturating_add(TAG_LEN);
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Deserialize from wire format: `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the input is shorter than 28 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SEALED_LEN {
            return Err(CryptoError::Encryption(format!(
                "sealed data too short: {} bytes (minimum {MIN_SEALED_LEN})",
                bytes.len()
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);

        let ct_end = bytes
            .len()
            .checked_sub(TAG_LEN)
            .ok_or_else(|| CryptoError::Encryption("sealed data length underflow".into()))?;
        let ciphertext = bytes[NONCE_LEN..ct_end].to_vec();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[ct_end..]);

        Ok(Self {
            nonce,
            ciphertext,
            tag,
        })
    }
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

fn sealing_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

/// Encrypt plaintext using AES-256-GCM with a random 96-bit nonce.
///
/// `aad` is authenticated but not encrypted and must match on decryption.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not exactly 32 bytes or
/// the underlying encryption fails. Returns `CryptoError::NotSeeded` if no
/// nonce can be drawn from the OS entropy source.
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedData, CryptoError> {
    let less_safe_key = sealing_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::NotSeeded(format!("cannot draw nonce: {e}")))?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place; the plaintext buffer becomes ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        less_safe_key.seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Decrypt AES-256-GCM authenticated ciphertext.
///
/// Returns the plaintext as a [`SecretBuffer`]. The intermediate buffer is
/// zeroized after copying.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not exactly 32 bytes.
/// Returns `CryptoError::Decryption` if authentication fails (tampered data,
/// wrong key, or wrong AAD).
pub fn decrypt(sealed: &SealedData, key: &[u8], aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let less_safe_key = sealing_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    let mut ct_tag = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&sealed.ciphertext);
    ct_tag.extend_from_slice(&sealed.tag);

    let result = match less_safe_key.open_in_place(nonce, aead::Aad::from(aad), &mut ct_tag) {
        Ok(plaintext) => Ok(SecretBuffer::new(plaintext)),
        Err(_) => Err(CryptoError::Decryption),
    };
    ct_tag.zeroize();
    result
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Fixed test key, 32 bytes of 0xAA.
    const TEST_KEY: [u8; KEY_LEN] = [0xAA; KEY_LEN];

    /// Different key for wrong-key tests.
    const WRONG_KEY: [u8; KEY_LEN] = [0xBB; KEY_LEN];

    #[test]
    fn encrypt_produces_correct_lengths() {
        let plaintext = b"hello, coffre!";
        let sealed = encrypt(plaintext, &TEST_KEY, &[]).expect("encrypt should succeed");
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_eq!(sealed.to_bytes().len(), NONCE_LEN + plaintext.len() + TAG_LEN);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let plaintext = b"secret property value";
        let sealed = encrypt(plaintext, &TEST_KEY, &[]).expect("encrypt should succeed");
        let decrypted = decrypt(&sealed, &TEST_KEY, &[]).expect("decrypt should succeed");
        assert_eq!(decrypted.expose(), plaintext);
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let mut tampered = encrypt(b"test data", &TEST_KEY, &[]).expect("encrypt should succeed");
        if let Some(byte) = tampered.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        assert!(matches!(
            decrypt(&tampered, &TEST_KEY, &[]),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn decrypt_fails_on_tampered_tag() {
        let mut tampered = encrypt(b"test data", &TEST_KEY, &[]).expect("encrypt should succeed");
        tampered.tag[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&tampered, &TEST_KEY, &[]),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let sealed = encrypt(b"test data", &TEST_KEY, &[]).expect("encrypt should succeed");
        assert!(matches!(
            decrypt(&sealed, &WRONG_KEY, &[]),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn encrypt_rejects_wrong_key_length() {
        let err = encrypt(b"test", &[0u8; 31], &[]).expect_err("should fail");
        assert!(format!("{err}").contains("invalid key length"));
    }

    #[test]
    fn encrypt_empty_plaintext_succeeds() {
        let sealed = encrypt(&[], &TEST_KEY, &[]).expect("encrypt empty should succeed");
        assert!(sealed.ciphertext.is_empty());
        let decrypted = decrypt(&sealed, &TEST_KEY, &[]).expect("decrypt empty should succeed");
        assert!(decrypted.expose().is_empty());
    }

    #[test]
    fn two_encrypts_produce_different_nonces() {
        let a = encrypt(b"same data", &TEST_KEY, &[]).expect("encrypt should succeed");
        let b = encrypt(b"same data", &TEST_KEY, &[]).expect("encrypt should succeed");
        assert_ne!(a.nonce, b.nonce, "nonces should differ");
    }

    #[test]
    fn sealed_data_to_from_bytes_roundtrip() {
        let sealed = encrypt(b"bytes test", &TEST_KEY, &[]).expect("encrypt should succeed");
        let restored = SealedData::from_bytes(&sealed.to_bytes()).expect("from_bytes");
        assert_eq!(sealed, restored);
    }

    #[test]
    fn sealed_data_from_bytes_rejects_short_input() {
        assert!(SealedData::from_bytes(&[0u8; 27]).is_err());
    }

    #[test]
    fn aad_mismatch_causes_decryption_failure() {
        let sealed = encrypt(b"aad test", &TEST_KEY, b"correct aad").expect("encrypt");
        assert!(matches!(
            decrypt(&sealed, &TEST_KEY, b"wrong aad"),
            Err(CryptoError::Decryption)
        ));
    }
}
