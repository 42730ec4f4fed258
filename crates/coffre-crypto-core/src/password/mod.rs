//! Password generation.
//!
//! Two generators are available behind the [`PasswordGenerator`] trait:
//! - [`RandomPasswordGenerator`]: OS CSPRNG bytes rendered as base64
//! - [`ExternalPasswordGenerator`]: runs a configured program
//!
//! [`get_generator`] resolves a configuration string to one of them.

use std::fmt;
use std::process::Command;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Default password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A source of password candidates.
pub trait PasswordGenerator {
    /// Produce a password of (at most, for external programs) `length` characters.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::NotSeeded` when no entropy is available or
    /// `CryptoError::ExternalProgram` when an external generator fails.
    fn get_password(&self, length: usize) -> Result<String, CryptoError>;
}

/// Generator selector as stored in the settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorKind {
    Random,
    External,
}

impl GeneratorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Random => "RANDOM",
            Self::External => "EXTERNAL",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorKind {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RANDOM" => Ok(Self::Random),
            "EXTERNAL" => Ok(Self::External),
            other => Err(CryptoError::InvalidArgument(format!(
                "unknown password generator type: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Random generator
// ---------------------------------------------------------------------------

/// Draws `ceil(length * 3 / 4)` bytes from the OS and renders them as
/// base64 (no padding), truncated to `length`.
///
/// The output alphabet is `A-Z a-z 0-9 + /`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPasswordGenerator;

impl RandomPasswordGenerator {
    /// Number of random bytes needed for `length` base64 characters.
    #[must_use]
    pub const fn byte_count(length: usize) -> usize {
        length.saturating_mul(3).div_ceil(4)
    }
}

impl PasswordGenerator for RandomPasswordGenerator {
    fn get_password(&self, length: usize) -> Result<String, CryptoError> {
        let mut bytes = vec![0u8; Self::byte_count(length)];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::NotSeeded(format!("OS entropy source unavailable: {e}")))?;
        let mut encoded = STANDARD_NO_PAD.encode(&bytes);
        bytes.zeroize();
        encoded.truncate(length);
        Ok(encoded)
    }
}

// ---------------------------------------------------------------------------
// External generator
// ---------------------------------------------------------------------------

/// Runs `program <length>` and uses its trimmed standard output.
#[derive(Clone, Debug)]
pub struct ExternalPasswordGenerator {
    program: String,
}

impl ExternalPasswordGenerator {
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidArgument` if `program` is blank.
    pub fn new(program: &str) -> Result<Self, CryptoError> {
        let program = program.trim();
        if program.is_empty() {
            return Err(CryptoError::InvalidArgument(
                "external password generator needs a program path".into(),
            ));
        }
        Ok(Self {
            program: program.to_string(),
        })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl PasswordGenerator for ExternalPasswordGenerator {
    fn get_password(&self, length: usize) -> Result<String, CryptoError> {
        let output = Command::new(&self.program)
            .arg(length.to_string())
            .output()
            .map_err(|e| {
                CryptoError::ExternalProgram(format!("cannot run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(CryptoError::ExternalProgram(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        let mut stdout = String::from_utf8(output.stdout).map_err(|_| {
            CryptoError::ExternalProgram(format!("{} produced non UTF-8 output", self.program))
        })?;
        let password = stdout.trim().to_string();
        stdout.zeroize();

        if password.is_empty() {
            return Err(CryptoError::ExternalProgram(format!(
                "{} produced no output",
                self.program
            )));
        }
        Ok(password)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Resolve a generator type string to a generator.
///
/// `additional` is the type-specific argument: the program path for
/// `"EXTERNAL"`, ignored for `"RANDOM"`.
///
/// # Errors
///
/// Returns `CryptoError::InvalidArgument` for an unknown type string or an
/// empty program path.
pub fn get_generator(
    kind: &str,
    additional: &str,
) -> Result<Box<dyn PasswordGenerator>, CryptoError> {
    match kind.parse::<GeneratorKind>()? {
        GeneratorKind::Random => Ok(Box::new(RandomPasswordGenerator)),
        GeneratorKind::External => Ok(Box::new(ExternalPasswordGenerator::new(additional)?)),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
