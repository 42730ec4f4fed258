//! Document deserialization.
//!
//! Loading happens in three steps, each with its own failure class:
//!
//! 1. [`ParsedDocument::parse`]: structural check of the whole file.
//!    Anything malformed is `Xml`/`Corrupt`.
//! 2. [`ParsedDocument::unlock`]: derive the key and decrypt the check
//!    field. A failure here is `WrongPassword`.
//! 3. [`ParsedDocument::build_tree`]: rebuild the tree and decrypt every
//!    value. With the marker verified, any failure is `Corrupt`.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use coffre_crypto_core::{Argon2idParams, CryptoError, EncryptionScheme, StrengthEstimator};
use tracing::debug;
use zeroize::Zeroize;

use super::xml::XmlElement;
use super::{
    DocumentCipher, CATEGORY_ELEMENT, CRYPTO_ELEMENT, DOCUMENT_ELEMENT, ENTRY_ELEMENT,
    FORMAT_VERSION, INTEGRITY_MARKER, KDF_ARGON2ID, PASSWORDS_ELEMENT,
};
use crate::error::VaultError;
use crate::property::{Property, PROPERTY_ELEMENT};
use crate::tree::{NodeId, PasswordTree};

/// Contents of the `<crypto>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptoHeader {
    pub scheme: EncryptionScheme,
    /// Absent for [`EncryptionScheme::None`].
    pub params: Option<Argon2idParams>,
    pub salt: Vec<u8>,
    pub check: Vec<u8>,
}

impl CryptoHeader {
    fn from_element(element: &XmlElement) -> Result<Self, VaultError> {
        let scheme = element
            .attribute("scheme")
            .ok_or_else(|| VaultError::Corrupt("crypto header without scheme".into()))?
            .parse::<EncryptionScheme>()
            .map_err(|e| VaultError::Corrupt(e.to_string()))?;
        let check = decode_attribute(element, "check")?;

        match scheme {
            EncryptionScheme::None => Ok(Self {
                scheme,
                params: None,
                salt: Vec::new(),
                check,
            }),
            EncryptionScheme::Aes256Gcm => {
                match element.attribute("kdf") {
                    Some(KDF_ARGON2ID) => {}
                    other => {
                        return Err(VaultError::Corrupt(format!(
                            "unsupported key derivation: {}",
                            other.unwrap_or("<missing>")
                        )))
                    }
                }
                let params = Argon2idParams {
                    m_cost: numeric_attribute(element, "mCost")?,
                    t_cost: numeric_attribute(element, "tCost")?,
                    p_cost: numeric_attribute(element, "pCost")?,
                };
                if !params.within_limits() {
                    return Err(VaultError::Corrupt(format!(
                        "key derivation parameters out of range (mCost={} tCost={} pCost={})",
                        params.m_cost, params.t_cost, params.p_cost
                    )));
                }
                Ok(Self {
                    scheme,
                    params: Some(params),
                    salt: decode_attribute(element, "salt")?,
                    check,
                })
            }
        }
    }
}

/// A structurally valid document whose values are still sealed.
#[derive(Clone, Debug)]
pub struct ParsedDocument {
    header: CryptoHeader,
    passwords: XmlElement,
}

impl ParsedDocument {
    /// Parse and structurally validate a whole document.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Xml`] if the input is not well-formed (truncated,
    ///   bad syntax)
    /// - [`VaultError::Corrupt`] if a required element or attribute is
    ///   missing or the version is unsupported
    pub fn parse(input: &str) -> Result<Self, VaultError> {
        let root = XmlElement::parse(input)?;
        if root.name != DOCUMENT_ELEMENT {
            return Err(VaultError::Corrupt(format!(
                "expected <{DOCUMENT_ELEMENT}> root, found <{}>",
                root.name
            )));
        }
        if let Some(version) = root.attribute("version") {
            if version != FORMAT_VERSION {
                return Err(VaultError::Corrupt(format!(
                    "unsupported document version {version}"
                )));
            }
        }

        let header = root
            .child(CRYPTO_ELEMENT)
            .ok_or_else(|| VaultError::Corrupt("missing <crypto> header".into()))
            .and_then(CryptoHeader::from_element)?;
        let passwords = root
            .child(PASSWORDS_ELEMENT)
            .cloned()
            .ok_or_else(|| VaultError::Corrupt("missing <passwords> element".into()))?;

        Ok(Self { header, passwords })
    }

    #[must_use]
    pub const fn header(&self) -> &CryptoHeader {
        &self.header
    }

    /// `false` for documents stored without encryption.
    #[must_use]
    pub fn needs_password(&self) -> bool {
        self.header.scheme != EncryptionScheme::None
    }

    /// Derive the key from `password` and verify the integrity marker.
    ///
    /// `password` is ignored for unencrypted documents.
    ///
    /// # Errors
    ///
    /// - [`VaultError::WrongPassword`] if the marker does not decrypt to its
    ///   expected value
    /// - [`VaultError::Corrupt`] if the stored KDF parameters are unusable or
    ///   the marker of an unencrypted document is damaged
    pub fn unlock(&self, password: &str) -> Result<DocumentCipher, VaultError> {
        let cipher = match (&self.header.scheme, &self.header.params) {
            (EncryptionScheme::None, _) => DocumentCipher::plain(),
            (EncryptionScheme::Aes256Gcm, Some(params)) => {
                DocumentCipher::derive(password, &self.header.salt, params).map_err(|e| {
                    match e {
                        VaultError::Crypto(CryptoError::KeyDerivation(detail)) => {
                            VaultError::Corrupt(format!("unusable key derivation header: {detail}"))
                        }
                        other => other,
                    }
                })?
            }
            (EncryptionScheme::Aes256Gcm, None) => {
                return Err(VaultError::Corrupt("missing key derivation parameters".into()))
            }
        };

        let matches = match cipher.encryptor().decrypt(&self.header.check) {
            Ok(mut plain) => {
                let ok = plain == INTEGRITY_MARKER.as_bytes();
                plain.zeroize();
                ok
            }
            Err(CryptoError::Decryption) => false,
            Err(e) => return Err(e.into()),
        };

        match (matches, self.needs_password()) {
            (true, _) => Ok(cipher),
            (false, true) => Err(VaultError::WrongPassword),
            (false, false) => Err(VaultError::Corrupt("integrity marker damaged".into())),
        }
    }

    /// Rebuild the tree, decrypting every encrypted value with `cipher`.
    ///
    /// Sibling order is preserved; absent `wasOpen`/`isSelected` flags are
    /// read as `false`.
    ///
    /// # Errors
    ///
    /// [`VaultError::Corrupt`] if the structure violates the schema or a
    /// value cannot be decrypted.
    pub fn build_tree(
        &self,
        cipher: &DocumentCipher,
        estimator: StrengthEstimator,
    ) -> Result<PasswordTree, VaultError> {
        let mut tree = PasswordTree::new(estimator);
        self.fill_tree(&mut tree, cipher)?;
        Ok(tree)
    }

    /// [`Self::build_tree`] into an existing, empty tree.
    ///
    /// On error the tree may hold a partial result; clear it before reuse.
    pub(crate) fn fill_tree(
        &self,
        tree: &mut PasswordTree,
        cipher: &DocumentCipher,
    ) -> Result<(), VaultError> {
        for child in &self.passwords.children {
            read_node(tree, None, child, cipher)?;
        }
        debug!(nodes = tree.node_count(), "document tree rebuilt");
        Ok(())
    }
}

/// Read, unlock and rebuild the document at `path` in one go.
///
/// # Errors
///
/// [`VaultError::Io`] if the file cannot be read, plus everything the three
/// [`ParsedDocument`] steps return.
pub fn read_document(
    path: &Path,
    password: &str,
    estimator: StrengthEstimator,
) -> Result<(PasswordTree, DocumentCipher), VaultError> {
    let parsed = parse_file(path)?;
    let cipher = parsed.unlock(password)?;
    let tree = parsed.build_tree(&cipher, estimator)?;
    Ok((tree, cipher))
}

/// Read and structurally validate the document at `path`.
///
/// # Errors
///
/// [`VaultError::Io`] if the file cannot be read, [`VaultError::Xml`] if it
/// is not UTF-8 or not well-formed, [`VaultError::Corrupt`] for schema
/// violations.
pub fn parse_file(path: &Path) -> Result<ParsedDocument, VaultError> {
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), len = bytes.len(), "document read");
    let text = String::from_utf8(bytes)
        .map_err(|e| VaultError::Xml(format!("document is not UTF-8: {e}")))?;
    ParsedDocument::parse(&text)
}

fn read_node(
    tree: &mut PasswordTree,
    parent: Option<NodeId>,
    element: &XmlElement,
    cipher: &DocumentCipher,
) -> Result<(), VaultError> {
    let name = element.attribute("name").ok_or_else(|| {
        VaultError::Corrupt(format!("<{}> without name", element.name))
    })?;

    match element.name.as_str() {
        CATEGORY_ELEMENT => {
            let id = tree.add_category(parent, name)?;
            if element.flag("wasOpen") {
                tree.set_open(id, true);
            }
            if element.flag("isSelected") {
                tree.set_selected(id, true);
            }
            for child in &element.children {
                read_node(tree, Some(id), child, cipher)?;
            }
        }
        ENTRY_ELEMENT => {
            let id = tree.add_entry(parent, name)?;
            if element.flag("isSelected") {
                tree.set_selected(id, true);
            }
            for child in &element.children {
                if child.name != PROPERTY_ELEMENT {
                    return Err(VaultError::Corrupt(format!(
                        "entry {name:?} contains <{}>",
                        child.name
                    )));
                }
                Property::append_from_xml(tree, id, child, cipher.encryptor()).map_err(
                    |e| match e {
                        VaultError::Crypto(CryptoError::Decryption) => VaultError::Corrupt(
                            format!("a value of entry {name:?} failed to decrypt"),
                        ),
                        other => other,
                    },
                )?;
            }
        }
        other => {
            return Err(VaultError::Corrupt(format!(
                "unexpected <{other}> in the password tree"
            )))
        }
    }
    Ok(())
}

fn decode_attribute(element: &XmlElement, key: &str) -> Result<Vec<u8>, VaultError> {
    let value = element
        .attribute(key)
        .ok_or_else(|| VaultError::Corrupt(format!("crypto header without {key}")))?;
    STANDARD
        .decode(value)
        .map_err(|e| VaultError::Corrupt(format!("crypto header {key} is not base64: {e}")))
}

fn numeric_attribute(element: &XmlElement, key: &str) -> Result<u32, VaultError> {
    element
        .attribute(key)
        .ok_or_else(|| VaultError::Corrupt(format!("crypto header without {key}")))?
        .parse()
        .map_err(|_| VaultError::Corrupt(format!("crypto header {key} is not a number")))
}
