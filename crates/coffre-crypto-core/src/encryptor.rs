//! The `Encryptor` capability and its variants.
//!
//! - [`NoopEncryptor`]: identity, for the explicit "no encryption" mode
//! - [`CipherEncryptor`]: AES-256-GCM keyed by an Argon2id-derived key
//! - [`CollectEncryptor`]: records every input instead of transforming it
//!
//! For every non-recording variant `decrypt(encrypt(x)) == x`.

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use crate::error::CryptoError;
use crate::kdf::{self, Argon2idParams, OUTPUT_LEN};
use crate::memory::SecretBytes;
use crate::symmetric::{self, SealedData};

/// AAD bound to every value sealed by [`CipherEncryptor`].
const VALUE_AAD: &[u8] = b"coffre-value-v1";

// ---------------------------------------------------------------------------
// Scheme identifier
// ---------------------------------------------------------------------------

/// Identifies how values in a document were encrypted.
///
/// The output format of an encryptor is stable for a given scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionScheme {
    /// Values are stored as-is.
    None,
    /// Values are sealed with AES-256-GCM under an Argon2id-derived key.
    Aes256Gcm,
}

impl EncryptionScheme {
    /// Identifier written to the document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionScheme {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "AES-256-GCM" => Ok(Self::Aes256Gcm),
            other => Err(CryptoError::InvalidArgument(format!(
                "unknown encryption scheme: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Byte-level and string-level encryption.
pub trait Encryptor {
    /// Encrypt bytes. The output is self-contained (nonce and tag included).
    ///
    /// # Errors
    ///
    /// Returns a [`CryptoError`] if the underlying cipher fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt bytes produced by [`Encryptor::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] when the ciphertext is malformed or
    /// the key is wrong; the two cases are indistinguishable here.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Scheme identifier stored alongside the encrypted values.
    fn scheme(&self) -> EncryptionScheme;

    /// Encrypt the UTF-8 bytes of `text`.
    ///
    /// # Errors
    ///
    /// See [`Encryptor::encrypt`].
    fn encrypt_string(&self, text: &str) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(text.as_bytes())
    }

    /// Decrypt bytes produced by [`Encryptor::encrypt_string`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if decryption fails or the
    /// plaintext is not valid UTF-8.
    fn decrypt_string(&self, ciphertext: &[u8]) -> Result<String, CryptoError> {
        let bytes = self.decrypt(ciphertext)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::Decryption)
    }
}

// ---------------------------------------------------------------------------
// NoopEncryptor
// ---------------------------------------------------------------------------

/// Passes bytes through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEncryptor;

impl Encryptor for NoopEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(ciphertext.to_vec())
    }

    fn scheme(&self) -> EncryptionScheme {
        EncryptionScheme::None
    }
}

// ---------------------------------------------------------------------------
// CipherEncryptor
// ---------------------------------------------------------------------------

/// AES-256-GCM encryptor keyed by a value derived from the master password.
///
/// Keeps the salt and KDF parameters it was derived with so a document can
/// be saved again without re-prompting for the password.
#[derive(Clone)]
pub struct CipherEncryptor {
    key: SecretBytes<OUTPUT_LEN>,
    salt: Vec<u8>,
    params: Argon2idParams,
}

impl CipherEncryptor {
    /// Derive the key from `password` with Argon2id.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyDerivation` for a short salt or invalid params.
    pub fn derive(
        password: &[u8],
        salt: &[u8],
        params: &Argon2idParams,
    ) -> Result<Self, CryptoError> {
        let key = kdf::derive(password, salt, params)?;
        Ok(Self {
            key,
            salt: salt.to_vec(),
            params: params.clone(),
        })
    }

    /// Build from an already derived key.
    #[must_use]
    pub fn from_key(key: SecretBytes<OUTPUT_LEN>, salt: &[u8], params: &Argon2idParams) -> Self {
        Self {
            key,
            salt: salt.to_vec(),
            params: params.clone(),
        }
    }

    /// The salt the key was derived with.
    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// The KDF parameters the key was derived with.
    #[must_use]
    pub const fn params(&self) -> &Argon2idParams {
        &self.params
    }
}

impl fmt::Debug for CipherEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherEncryptor")
            .field("key", &self.key)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Encryptor for CipherEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sealed = symmetric::encrypt(plaintext, self.key.expose(), VALUE_AAD)?;
        Ok(sealed.to_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sealed = SealedData::from_bytes(ciphertext).map_err(|_| CryptoError::Decryption)?;
        let plain = symmetric::decrypt(&sealed, self.key.expose(), VALUE_AAD)?;
        Ok(plain.expose().to_vec())
    }

    fn scheme(&self) -> EncryptionScheme {
        EncryptionScheme::Aes256Gcm
    }
}

// ---------------------------------------------------------------------------
// CollectEncryptor
// ---------------------------------------------------------------------------

/// Records every byte sequence passed to it and returns it untransformed.
///
/// Used in tests to observe exactly which values a writer sends through
/// encryption.
#[derive(Debug, Default)]
pub struct CollectEncryptor {
    encrypted: RefCell<Vec<Vec<u8>>>,
    decrypted: RefCell<Vec<Vec<u8>>>,
}

impl CollectEncryptor {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs of every `encrypt` call, in call order.
    #[must_use]
    pub fn encrypted(&self) -> Vec<Vec<u8>> {
        self.encrypted.borrow().clone()
    }

    /// Inputs of every `decrypt` call, in call order.
    #[must_use]
    pub fn decrypted(&self) -> Vec<Vec<u8>> {
        self.decrypted.borrow().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.encrypted.borrow_mut().clear();
        self.decrypted.borrow_mut().clear();
    }
}

impl Encryptor for CollectEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypted.borrow_mut().push(plaintext.to_vec());
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.decrypted.borrow_mut().push(ciphertext.to_vec());
        Ok(ciphertext.to_vec())
    }

    fn scheme(&self) -> EncryptionScheme {
        EncryptionScheme::None
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
