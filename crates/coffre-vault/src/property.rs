//! A single typed key/value field of an entry.
//!
//! Strength metadata is derived from the value and recomputed on every
//! change of value or type; callers cannot set it directly.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use coffre_crypto_core::{CryptoError, Encryptor, PasswordStrength, StrengthEstimator};
use zeroize::Zeroize;

use crate::document::xml::XmlElement;
use crate::error::VaultError;
use crate::tree::{NodeId, PasswordTree};

/// Element name of a property in the document.
pub const PROPERTY_ELEMENT: &str = "property";

/// What is shown instead of a hidden value.
pub const HIDDEN_MASK: &str = "******";

// ---------------------------------------------------------------------------
// PropertyType
// ---------------------------------------------------------------------------

/// Semantic type of a property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PropertyType {
    #[default]
    Misc,
    Username,
    Password,
    Url,
}

impl PropertyType {
    /// Identifier written to the `type` attribute.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Misc => "MISC",
            Self::Username => "USERNAME",
            Self::Password => "PASSWORD",
            Self::Url => "URL",
        }
    }

    /// Key given to a freshly added property of this type.
    #[must_use]
    pub const fn default_key(self) -> &'static str {
        match self {
            Self::Misc => "Misc",
            Self::Username => "Username",
            Self::Password => "Password",
            Self::Url => "URL",
        }
    }

    /// Passwords are encrypted and hidden by default; everything else is not.
    #[must_use]
    pub const fn is_secret_by_default(self) -> bool {
        matches!(self, Self::Password)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MISC" => Ok(Self::Misc),
            "USERNAME" => Ok(Self::Username),
            "PASSWORD" => Ok(Self::Password),
            "URL" => Ok(Self::Url),
            other => Err(VaultError::Corrupt(format!("unknown property type: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// One field of an entry.
///
/// The value is zeroized when the property is dropped.
#[derive(Clone)]
pub struct Property {
    key: String,
    value: String,
    kind: PropertyType,
    encrypted: bool,
    hidden: bool,
    strength: PasswordStrength,
    days_to_crack: f64,
}

impl Property {
    /// Create a property and evaluate its strength.
    #[must_use]
    pub fn new(
        key: &str,
        value: &str,
        kind: PropertyType,
        encrypted: bool,
        hidden: bool,
        estimator: &StrengthEstimator,
    ) -> Self {
        let mut property = Self {
            key: key.to_string(),
            value: value.to_string(),
            kind,
            encrypted,
            hidden,
            strength: PasswordStrength::Undefined,
            days_to_crack: 0.0,
        };
        property.update_password_strength(estimator);
        property
    }

    /// Empty property with the defaults for `kind`.
    #[must_use]
    pub fn with_defaults(kind: PropertyType, estimator: &StrengthEstimator) -> Self {
        let secret = kind.is_secret_by_default();
        Self::new(kind.default_key(), "", kind, secret, secret, estimator)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub const fn kind(&self) -> PropertyType {
        self.kind
    }

    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    #[must_use]
    pub const fn strength(&self) -> PasswordStrength {
        self.strength
    }

    #[must_use]
    pub const fn days_to_crack(&self) -> f64 {
        self.days_to_crack
    }

    /// The value, or [`HIDDEN_MASK`] when the property is hidden.
    #[must_use]
    pub fn visible_value(&self) -> &str {
        if self.hidden {
            HIDDEN_MASK
        } else {
            &self.value
        }
    }

    pub fn set_key(&mut self, key: &str) {
        self.key = key.to_string();
    }

    pub fn set_value(&mut self, value: &str, estimator: &StrengthEstimator) {
        self.value.zeroize();
        self.value = value.to_string();
        self.update_password_strength(estimator);
    }

    pub fn set_type(&mut self, kind: PropertyType, estimator: &StrengthEstimator) {
        self.kind = kind;
        self.update_password_strength(estimator);
    }

    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Recompute strength with the fast checker. Non-password properties are
    /// reset to `Undefined`.
    pub fn update_password_strength(&mut self, estimator: &StrengthEstimator) {
        if self.kind == PropertyType::Password {
            let report = estimator.evaluate(&self.value);
            self.strength = report.strength;
            self.days_to_crack = report.days_to_crack;
        } else {
            self.strength = PasswordStrength::Undefined;
            self.days_to_crack = 0.0;
        }
    }

    /// Recompute strength with the slow checker when one is configured.
    ///
    /// # Errors
    ///
    /// Propagates the slow checker's failure; the cached values are left
    /// unchanged in that case.
    pub fn update_password_strength_thorough(
        &mut self,
        estimator: &StrengthEstimator,
    ) -> Result<(), CryptoError> {
        if self.kind == PropertyType::Password {
            let report = estimator.evaluate_thorough(&self.value)?;
            self.strength = report.strength;
            self.days_to_crack = report.days_to_crack;
        } else {
            self.strength = PasswordStrength::Undefined;
            self.days_to_crack = 0.0;
        }
        Ok(())
    }

    /// Append a `<property>` element to `parent`.
    ///
    /// Encrypted values go through `encryptor.encrypt_string` and are stored
    /// as standard base64; others are written verbatim.
    ///
    /// # Errors
    ///
    /// Propagates encryption failures.
    pub fn append_xml(
        &self,
        parent: &mut XmlElement,
        encryptor: &dyn Encryptor,
    ) -> Result<(), VaultError> {
        let mut element = XmlElement::new(PROPERTY_ELEMENT)
            .with_attribute("key", &self.key)
            .with_attribute("type", self.kind.as_str());
        element.set_flag("hidden", self.hidden);
        element.set_flag("encrypted", self.encrypted);
        element.text = if self.encrypted {
            STANDARD.encode(encryptor.encrypt_string(&self.value)?)
        } else {
            self.value.clone()
        };
        parent.push_child(element);
        Ok(())
    }

    /// Rebuild a property from a `<property>` element.
    ///
    /// Absent `type`/`hidden`/`encrypted` attributes mean `MISC`/`false`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Corrupt`] for a wrong element, a missing key, an
    ///   unknown type, or ciphertext that is not valid base64
    /// - [`VaultError::Crypto`] if the value cannot be decrypted
    pub fn from_xml(
        element: &XmlElement,
        encryptor: &dyn Encryptor,
        estimator: &StrengthEstimator,
    ) -> Result<Self, VaultError> {
        if element.name != PROPERTY_ELEMENT {
            return Err(VaultError::Corrupt(format!(
                "expected <{PROPERTY_ELEMENT}>, found <{}>",
                element.name
            )));
        }
        let key = element
            .attribute("key")
            .ok_or_else(|| VaultError::Corrupt("property without key".into()))?;
        let kind = element
            .attribute("type")
            .map_or(Ok(PropertyType::Misc), |t| t.parse::<PropertyType>())?;
        let hidden = element.flag("hidden");
        let encrypted = element.flag("encrypted");

        let value = if encrypted {
            let mut sealed = STANDARD.decode(element.text.trim()).map_err(|e| {
                VaultError::Corrupt(format!("property {key:?} is not valid base64: {e}"))
            })?;
            let plain = encryptor.decrypt_string(&sealed);
            sealed.zeroize();
            plain?
        } else {
            element.text.clone()
        };

        let property = Self::new(key, &value, kind, encrypted, hidden, estimator);
        let mut value = value;
        value.zeroize();
        Ok(property)
    }

    /// Rebuild a property from `element` and append it to `entry`.
    ///
    /// Returns the index of the new property.
    ///
    /// # Errors
    ///
    /// Everything [`Self::from_xml`] returns, plus
    /// [`VaultError::InvalidArgument`] if `entry` is not an entry node.
    pub fn append_from_xml(
        tree: &mut PasswordTree,
        entry: NodeId,
        element: &XmlElement,
        encryptor: &dyn Encryptor,
    ) -> Result<usize, VaultError> {
        let property = Self::from_xml(element, encryptor, tree.estimator())?;
        tree.append_property(entry, property)
            .ok_or_else(|| VaultError::InvalidArgument("properties belong to entries".into()))
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.value == other.value
            && self.kind == other.kind
            && self.encrypted == other.encrypted
            && self.hidden == other.hidden
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("key", &self.key)
            .field("value", &"***")
            .field("kind", &self.kind)
            .field("encrypted", &self.encrypted)
            .field("hidden", &self.hidden)
            .field("strength", &self.strength)
            .finish_non_exhaustive()
    }
}

impl Drop for Property {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
