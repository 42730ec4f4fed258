//! Argon2id key derivation from the master password.
//!
//! This module provides:
//! - [`derive`]: derive a 256-bit key from a password + salt using Argon2id
//! - [`generate_salt`]: fresh random salt for a new document or password
//! - [`Argon2idParams`]: serializable parameter set (stored in the document)
//! - [`KdfPreset`]: Fast / Balanced / Maximum preset selector
//!
//! Derivation is deterministic: the same password, salt and parameters
//! always yield the same key, which is what keeps previously saved documents
//! decryptable. The raw password is never stored.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Output length of the KDF in bytes (256 bits).
pub const OUTPUT_LEN: usize = 32;

/// Minimum salt length in bytes. We enforce 16 (stricter than argon2's 8).
pub const MIN_SALT_LEN: usize = 16;

/// Salt length used for new documents.
pub const SALT_LEN: usize = 16;

/// 512 MB in KiB.
const MEMORY_512MB: u32 = 524_288;

/// 256 MB in KiB.
const MEMORY_256MB: u32 = 262_144;

/// 64 MB in KiB.
const MEMORY_64MB: u32 = 65_536;

/// Largest accepted memory cost: the `Maximum` preset.
pub const MAX_M_COST: u32 = MEMORY_512MB;

/// Largest accepted iteration count.
pub const MAX_T_COST: u32 = 16;

/// Largest accepted lane count.
pub const MAX_P_COST: u32 = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Argon2id parameter set, stored next to the salt in the document.
///
/// Fields use the `argon2` crate convention:
/// - `m_cost`: memory in KiB (NOT bytes, NOT MB)
/// - `t_cost`: number of iterations
/// - `p_cost`: degree of parallelism
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2idParams {
    /// Memory cost in kibibytes (1 KiB = 1024 bytes).
    pub m_cost: u32,
    /// Number of iterations (time cost).
    pub t_cost: u32,
    /// Degree of parallelism (number of lanes).
    pub p_cost: u32,
}

impl Argon2idParams {
    /// `true` if no cost exceeds [`MAX_M_COST`], [`MAX_T_COST`] or
    /// [`MAX_P_COST`].
    ///
    /// Parameters read from a document are untrusted; anything above these
    /// ceilings is rejected before Argon2 allocates.
    #[must_use]
    pub const fn within_limits(&self) -> bool {
        self.m_cost <= MAX_M_COST && self.t_cost <= MAX_T_COST && self.p_cost <= MAX_P_COST
    }
}

impl Default for Argon2idParams {
    fn default() -> Self {
        KdfPreset::Fast.default_params()
    }
}

/// KDF preset selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfPreset {
    /// Quick unlock on modest hardware.
    Fast,
    /// Recommended daily driver.
    Balanced,
    /// Maximum brute-force resistance.
    Maximum,
}

impl KdfPreset {
    /// Return the parameters for this preset.
    #[must_use]
    pub const fn default_params(self) -> Argon2idParams {
        match self {
            Self::Fast => Argon2idParams {
                m_cost: MEMORY_64MB,
                t_cost: 3,
                p_cost: 4,
            },
            Self::Balanced => Argon2idParams {
                m_cost: MEMORY_256MB,
                t_cost: 3,
                p_cost: 4,
            },
            Self::Maximum => Argon2idParams {
                m_cost: MEMORY_512MB,
                t_cost: 4,
                p_cost: 4,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from a password and salt using Argon2id.
///
/// The intermediate output buffer is zeroized after copying into the
/// returned [`SecretBytes`].
///
/// This function accepts any password length, including empty. Master
/// password admissibility is enforced by the caller before reaching it.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if:
/// - The salt is shorter than 16 bytes
/// - A cost exceeds its ceiling (see [`Argon2idParams::within_limits`])
/// - The argon2 parameters are invalid
/// - The derivation itself fails (e.g., memory allocation)
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &Argon2idParams,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    if !params.within_limits() {
        return Err(CryptoError::KeyDerivation(format!(
            "argon2 params above limits: m={} t={} p={}",
            params.m_cost, params.t_cost, params.p_cost
        )));
    }

    let argon2_params = argon2::Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(OUTPUT_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; OUTPUT_LEN];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2id derivation failed: {e}")))?;

    let key = SecretBytes::new(output);
    output.zeroize();
    Ok(key)
}

/// Generate a fresh random salt of [`SALT_LEN`] bytes.
///
/// # Errors
///
/// Returns `CryptoError::NotSeeded` if the OS entropy source is unavailable.
pub fn generate_salt() -> Result<Vec<u8>, CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::NotSeeded(format!("cannot generate salt: {e}")))?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Small params for fast tests: 32 KiB, 1 iteration, 1 lane.
    const TEST_PARAMS: Argon2idParams = Argon2idParams {
        m_cost: 32,
        t_cost: 1,
        p_cost: 1,
    };

    const TEST_SALT: &[u8; 16] = b"0123456789abcdef";

    #[test]
    fn derive_produces_32_byte_output() {
        let key = derive(b"password", TEST_SALT, &TEST_PARAMS).expect("derive should succeed");
        assert_eq!(key.expose().len(), 32);
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive(b"password", TEST_SALT, &TEST_PARAMS).expect("derive should succeed");
        let b = derive(b"password", TEST_SALT, &TEST_PARAMS).expect("derive should succeed");
        assert_eq!(a.expose(), b.expose());
    }

    #[test]
    fn derive_different_salts_produce_different_keys() {
        let a = derive(b"password", b"salt_aaaaaaaaaaaaa", &TEST_PARAMS)
            .expect("derive should succeed");
        let b = derive(b"password", b"salt_bbbbbbbbbbbbb", &TEST_PARAMS)
            .expect("derive should succeed");
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn derive_different_passwords_produce_different_keys() {
        let a = derive(b"password_a", TEST_SALT, &TEST_PARAMS).expect("derive should succeed");
        let b = derive(b"password_b", TEST_SALT, &TEST_PARAMS).expect("derive should succeed");
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn derive_rejects_short_salt() {
        let err = derive(b"password", b"short", &TEST_PARAMS)
            .expect_err("derive should reject short salt");
        assert!(format!("{err}").contains("salt too short"));
    }

    #[test]
    fn derive_rejects_invalid_params() {
        let bad = Argon2idParams {
            m_cost: 1,
            t_cost: 0,
            p_cost: 1,
        };
        let err = derive(b"password", TEST_SALT, &bad).expect_err("params must be rejected");
        assert!(matches!(err, CryptoError::KeyDerivation(_)));
    }

    #[test]
    fn generate_salt_is_random() {
        let a = generate_salt().expect("salt");
        let b = generate_salt().expect("salt");
        assert_eq!(a.len(), SALT_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn presets_are_within_limits() {
        for preset in [KdfPreset::Fast, KdfPreset::Balanced, KdfPreset::Maximum] {
            assert!(preset.default_params().within_limits(), "{preset:?}");
        }
    }

    #[test]
    fn oversized_params_rejected_before_allocation() {
        let oversized = [
            Argon2idParams {
                m_cost: 4_000_000_000,
                ..TEST_PARAMS
            },
            Argon2idParams {
                t_cost: MAX_T_COST + 1,
                ..TEST_PARAMS
            },
            Argon2idParams {
                p_cost: MAX_P_COST + 1,
                ..TEST_PARAMS
            },
        ];
        for params in &oversized {
            assert!(!params.within_limits());
            let err = derive(b"password", TEST_SALT, params).expect_err("must be rejected");
            assert!(matches!(err, CryptoError::KeyDerivation(_)));
        }
    }

    #[test]
    fn default_params_are_fast_preset() {
        assert_eq!(Argon2idParams::default(), KdfPreset::Fast.default_params());
    }

    #[test]
    fn argon2id_params_serde_roundtrip() {
        let params = KdfPreset::Balanced.default_params();
        let json = serde_json::to_string(&params).expect("serialize should succeed");
        let back: Argon2idParams = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(params, back);
    }
}
