//! `coffre-crypto-core`: Pure cryptographic primitives for Coffre.
//!
//! Key derivation, value encryption, password strength estimation and
//! password generation. No file formats, no logging, no I/O beyond reading
//! a dictionary file and spawning an external generator.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod kdf;
pub mod symmetric;

pub mod encryptor;

pub mod strength;

pub mod password;

pub use encryptor::{
    CipherEncryptor, CollectEncryptor, EncryptionScheme, Encryptor, NoopEncryptor,
};
pub use error::CryptoError;
pub use kdf::{
    derive, generate_salt, Argon2idParams, KdfPreset, MAX_M_COST, MAX_P_COST, MAX_T_COST,
};
pub use memory::{constant_time_eq, SecretBuffer, SecretBytes};
pub use password::{
    get_generator, ExternalPasswordGenerator, GeneratorKind, PasswordGenerator,
    RandomPasswordGenerator, DEFAULT_PASSWORD_LENGTH,
};
pub use strength::{
    estimate_entropy_bits, CheckerConstraints, CrackModel, DictionaryChecker, EntropyChecker,
    MasterPasswordChecker, PasswordChecker, PasswordQuality, PasswordStrength, StrengthEstimator,
    StrengthReport, StrengthThresholds,
};
pub use symmetric::{decrypt, encrypt, SealedData};
