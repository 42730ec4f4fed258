//! The persisted password document.
//!
//! ```text
//! <document version="1">
//!   <crypto scheme="AES-256-GCM" kdf="ARGON2ID" mCost=".." tCost=".." pCost=".."
//!           salt="base64" check="base64"/>
//!   <passwords>
//!     <category name=".." wasOpen="0|1" isSelected="0|1">
//!       <category>..</category>*
//!       <entry name=".." isSelected="0|1">
//!         <property key=".." type="MISC|USERNAME|PASSWORD|URL" hidden="0|1" encrypted="0|1">..</property>*
//!       </entry>*
//!     </category>*
//!   </passwords>
//! </document>
//! ```
//!
//! `check` is the encrypted [`INTEGRITY_MARKER`]. It is decrypted before any
//! property so a wrong password is told apart from a damaged body.

pub mod load;
pub mod reader;
pub mod writer;
pub mod xml;

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use coffre_crypto_core::{
    Argon2idParams, CipherEncryptor, EncryptionScheme, Encryptor, NoopEncryptor,
};

use crate::error::VaultError;
use xml::XmlElement;

/// Plaintext of the integrity check field.
pub const INTEGRITY_MARKER: &str = "coffre-integrity-marker-v1";

/// Current document format version.
pub const FORMAT_VERSION: &str = "1";

/// Identifier of the only supported key derivation.
pub const KDF_ARGON2ID: &str = "ARGON2ID";

pub(crate) const DOCUMENT_ELEMENT: &str = "document";
pub(crate) const CRYPTO_ELEMENT: &str = "crypto";
pub(crate) const PASSWORDS_ELEMENT: &str = "passwords";
pub(crate) const CATEGORY_ELEMENT: &str = "category";
pub(crate) const ENTRY_ELEMENT: &str = "entry";

/// The encryptor of an open document.
///
/// `Plain` is the explicit "no encryption" mode. `Sealed` keeps the salt and
/// KDF parameters so the document can be saved again without the password.
pub enum DocumentCipher {
    Plain(NoopEncryptor),
    Sealed(CipherEncryptor),
}

impl fmt::Debug for DocumentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("DocumentCipher::Plain"),
            Self::Sealed(c) => f.debug_tuple("DocumentCipher::Sealed").field(c).finish(),
        }
    }
}

impl DocumentCipher {
    #[must_use]
    pub const fn plain() -> Self {
        Self::Plain(NoopEncryptor)
    }

    /// Derive a sealing cipher from the master password.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if key derivation fails.
    pub fn derive(
        password: &str,
        salt: &[u8],
        params: &Argon2idParams,
    ) -> Result<Self, VaultError> {
        Ok(Self::Sealed(CipherEncryptor::derive(
            password.as_bytes(),
            salt,
            params,
        )?))
    }

    #[must_use]
    pub fn encryptor(&self) -> &dyn Encryptor {
        match self {
            Self::Plain(noop) => noop,
            Self::Sealed(cipher) => cipher,
        }
    }

    #[must_use]
    pub fn scheme(&self) -> EncryptionScheme {
        self.encryptor().scheme()
    }

    /// The `<crypto>` element describing this cipher, check field included.
    pub(crate) fn header_element(&self) -> Result<XmlElement, VaultError> {
        let check = self.encryptor().encrypt_string(INTEGRITY_MARKER)?;
        let mut element =
            XmlElement::new(CRYPTO_ELEMENT).with_attribute("scheme", self.scheme().as_str());
        if let Self::Sealed(cipher) = self {
            let params = cipher.params();
            element.set_attribute("kdf", KDF_ARGON2ID);
            element.set_attribute("mCost", &params.m_cost.to_string());
            element.set_attribute("tCost", &params.t_cost.to_string());
            element.set_attribute("pCost", &params.p_cost.to_string());
            element.set_attribute("salt", &STANDARD.encode(cipher.salt()));
        }
        element.set_attribute("check", &STANDARD.encode(check));
        Ok(element)
    }
}
