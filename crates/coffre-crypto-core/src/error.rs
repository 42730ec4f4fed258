//! Cryptographic error types for `coffre-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations, password checkers and
/// password generators.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (Argon2id parameter validation, memory allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM) or malformed sealed data.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed: ciphertext tampered or wrong key.
    ///
    /// This layer cannot tell a wrong key from corrupt data.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// API or configuration misuse (unknown generator type, bad parameter).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The cryptographically strong random source is not available.
    #[error("random number generator not seeded: {0}")]
    NotSeeded(String),

    /// The external password generator is missing or exited abnormally.
    #[error("external password generator failed: {0}")]
    ExternalProgram(String),

    /// A password checker could not evaluate (e.g. unreadable dictionary).
    #[error("password check failed: {0}")]
    PasswordCheck(String),
}
