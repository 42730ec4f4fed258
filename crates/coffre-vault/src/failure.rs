//! Structured load/save failures.
//!
//! Category and severity are orthogonal. The caller offers "Retry" only
//! when [`ReadWriteFailure::retry_is_meaningful`] is set, otherwise a
//! single acknowledgement.

use std::fmt;
use std::path::Path;

use coffre_crypto_core::CryptoError;

use crate::error::VaultError;

/// What went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureCategory {
    /// The integrity marker did not match; re-prompt for the password.
    WrongPassword,
    /// Malformed document structure.
    Corrupt,
    /// File system failure.
    Io,
    /// User cancellation. Never shown as a message.
    Abort,
    /// Configuration or API misuse. Never retried.
    InvalidArgument,
    /// No random source for key or nonce generation.
    NotSeeded,
}

impl FailureCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WrongPassword => "wrong-password",
            Self::Corrupt => "corrupt",
            Self::Io => "io",
            Self::Abort => "abort",
            Self::InvalidArgument => "invalid-argument",
            Self::NotSeeded => "not-seeded",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far the data can be trusted after the failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// The operation can sensibly continue (re-prompt, load a backup).
    Warning,
    /// Data integrity cannot be assumed.
    Critical,
}

/// A failed load or save, as presented to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadWriteFailure {
    pub category: FailureCategory,
    pub severity: Severity,
    pub message: String,
    pub retry_is_meaningful: bool,
}

impl fmt::Display for ReadWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.category, self.severity_str(), self.message)
    }
}

impl std::error::Error for ReadWriteFailure {}

impl ReadWriteFailure {
    #[must_use]
    pub fn new(
        category: FailureCategory,
        severity: Severity,
        message: impl Into<String>,
        retry_is_meaningful: bool,
    ) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            retry_is_meaningful,
        }
    }

    #[must_use]
    pub fn wrong_password() -> Self {
        Self::new(
            FailureCategory::WrongPassword,
            Severity::Warning,
            "The master password is wrong.",
            true,
        )
    }

    #[must_use]
    pub fn abort() -> Self {
        Self::new(FailureCategory::Abort, Severity::Warning, "", false)
    }

    /// Classify an error raised while loading `path`.
    ///
    /// `backup_available` makes corruption recoverable: it becomes a
    /// retryable `Warning` instead of a fatal `Critical`.
    #[must_use]
    pub fn from_load_error(err: &VaultError, path: &Path, backup_available: bool) -> Self {
        match err {
            VaultError::WrongPassword => Self::wrong_password(),
            VaultError::Xml(detail) | VaultError::Corrupt(detail) => {
                corrupt(path, detail, backup_available)
            }
            VaultError::Crypto(CryptoError::Decryption) => {
                corrupt(path, &err.to_string(), backup_available)
            }
            VaultError::Io(e) => Self::new(
                FailureCategory::Io,
                Severity::Critical,
                format!("Cannot read {}: {e}", path.display()),
                false,
            ),
            other => Self::from_other(other),
        }
    }

    /// Classify an error raised while saving `path`.
    ///
    /// The key is still held in memory, so every save failure is retryable
    /// without re-authentication.
    #[must_use]
    pub fn from_save_error(err: &VaultError, path: &Path) -> Self {
        match err {
            VaultError::Io(e) => Self::new(
                FailureCategory::Io,
                Severity::Critical,
                format!("Cannot write {}: {e}", path.display()),
                true,
            ),
            other => Self::from_other(other),
        }
    }

    fn from_other(err: &VaultError) -> Self {
        match err {
            VaultError::Crypto(CryptoError::NotSeeded(detail)) => Self::new(
                FailureCategory::NotSeeded,
                Severity::Critical,
                format!("No random source available: {detail}"),
                false,
            ),
            VaultError::InvalidArgument(_)
            | VaultError::Settings(_)
            | VaultError::NotOpen
            | VaultError::Crypto(CryptoError::InvalidArgument(_)) => Self::new(
                FailureCategory::InvalidArgument,
                Severity::Critical,
                err.to_string(),
                false,
            ),
            _ => Self::new(
                FailureCategory::Io,
                Severity::Critical,
                err.to_string(),
                true,
            ),
        }
    }

    /// `true` for a user cancellation.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        self.category == FailureCategory::Abort
    }

    const fn severity_str(&self) -> &'static str {
        match self.severity {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

fn corrupt(path: &Path, detail: &str, backup_available: bool) -> ReadWriteFailure {
    if backup_available {
        ReadWriteFailure::new(
            FailureCategory::Corrupt,
            Severity::Warning,
            format!(
                "{} is corrupt ({detail}). A backup is available.",
                path.display()
            ),
            true,
        )
    } else {
        ReadWriteFailure::new(
            FailureCategory::Corrupt,
            Severity::Critical,
            format!("{} is corrupt ({detail}).", path.display()),
            false,
        )
    }
}
