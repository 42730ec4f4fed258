//! Vault error types for `coffre-vault`.

use coffre_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by document, tree, settings and session operations.
///
/// The load/save orchestration turns these into a
/// [`ReadWriteFailure`](crate::failure::ReadWriteFailure) for the caller.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The integrity marker did not decrypt to the expected value.
    #[error("wrong master password")]
    WrongPassword,

    /// The document is not well-formed XML (truncated, bad syntax).
    #[error("malformed document: {0}")]
    Xml(String),

    /// Well-formed XML that does not follow the document schema, or a value
    /// that fails to decrypt after the marker was verified.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// API or configuration misuse.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Settings could not be read or written.
    #[error("settings error: {0}")]
    Settings(String),

    /// No document is open in the session.
    #[error("no document is open")]
    NotOpen,

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for VaultError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for VaultError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(err.to_string())
    }
}
