//! Application settings, stored as plain JSON next to the document.
//!
//! Settings are passed explicitly to whatever needs them; the builders below
//! turn them into the estimator, checker and generator objects.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use coffre_crypto_core::{
    get_generator, Argon2idParams, CrackModel, DictionaryChecker, GeneratorKind,
    MasterPasswordChecker, PasswordGenerator, StrengthEstimator, StrengthThresholds,
    DEFAULT_PASSWORD_LENGTH,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::VaultError;

// ── Settings ───────────────────────────────────────────────────────

/// User-configurable behavior.
///
/// Persisted to `{data_dir}/settings.json`. Missing fields take their
/// defaults so older files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Last opened document.
    #[serde(default)]
    pub datafile: Option<PathBuf>,

    /// `false` stores new documents without encryption.
    #[serde(default = "default_true")]
    pub encryption_enabled: bool,

    /// Argon2id parameters for new documents and password changes.
    #[serde(default)]
    pub kdf: Argon2idParams,

    /// Passwords crackable in fewer days are `Weak`.
    #[serde(default = "default_weak_below_days")]
    pub weak_below_days: f64,

    /// Passwords needing at least this many days are `Strong`.
    #[serde(default = "default_strong_from_days")]
    pub strong_from_days: f64,

    /// Attacker guess rate.
    #[serde(default = "default_cracks_per_second")]
    pub cracks_per_second: f64,

    /// Share of the search space an attacker covers on average (2 = half).
    #[serde(default = "default_average_case_divisor")]
    pub average_case_divisor: f64,

    #[serde(default = "default_min_master_password_length")]
    pub min_master_password_length: usize,

    /// Generator type string: `"RANDOM"` or `"EXTERNAL"`.
    #[serde(default = "default_generator")]
    pub generator: String,

    /// Program run by the `"EXTERNAL"` generator.
    #[serde(default)]
    pub external_generator: String,

    #[serde(default = "default_password_length")]
    pub password_length: usize,

    /// Word list for the on-demand dictionary checker.
    #[serde(default)]
    pub dictionary_file: Option<PathBuf>,

    /// Idle minutes before logout; `0` disables.
    #[serde(default)]
    pub auto_logout_minutes: u32,

    /// Keep `<file>.bak` of the previous save.
    #[serde(default = "default_true")]
    pub keep_backup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            datafile: None,
            encryption_enabled: true,
            kdf: Argon2idParams::default(),
            weak_below_days: default_weak_below_days(),
            strong_from_days: default_strong_from_days(),
            cracks_per_second: default_cracks_per_second(),
            average_case_divisor: default_average_case_divisor(),
            min_master_password_length: default_min_master_password_length(),
            generator: default_generator(),
            external_generator: String::new(),
            password_length: default_password_length(),
            dictionary_file: None,
            auto_logout_minutes: 0,
            keep_backup: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_weak_below_days() -> f64 {
    30.0
}

const fn default_strong_from_days() -> f64 {
    3650.0
}

const fn default_cracks_per_second() -> f64 {
    1e9
}

const fn default_average_case_divisor() -> f64 {
    2.0
}

const fn default_min_master_password_length() -> usize {
    MasterPasswordChecker::DEFAULT_MIN_LENGTH
}

fn default_generator() -> String {
    GeneratorKind::Random.as_str().to_string()
}

const fn default_password_length() -> usize {
    DEFAULT_PASSWORD_LENGTH
}

// ── Validation and builders ────────────────────────────────────────

impl Settings {
    /// Reject values the rest of the code cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), VaultError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.cracks_per_second) {
            return Err(VaultError::InvalidArgument(
                "cracksPerSecond must be positive".into(),
            ));
        }
        if !positive(self.average_case_divisor) {
            return Err(VaultError::InvalidArgument(
                "averageCaseDivisor must be positive".into(),
            ));
        }
        if !(self.weak_below_days >= 0.0 && self.weak_below_days <= self.strong_from_days) {
            return Err(VaultError::InvalidArgument(
                "weakBelowDays must not exceed strongFromDays".into(),
            ));
        }
        if !self.kdf.within_limits() {
            return Err(VaultError::InvalidArgument(
                "kdf parameters exceed the supported maximum".into(),
            ));
        }
        if self.password_length == 0 {
            return Err(VaultError::InvalidArgument(
                "passwordLength must be at least 1".into(),
            ));
        }
        self.generator
            .parse::<GeneratorKind>()
            .map_err(|e| VaultError::InvalidArgument(e.to_string()))?;
        Ok(())
    }

    #[must_use]
    pub const fn crack_model(&self) -> CrackModel {
        CrackModel {
            cracks_per_second: self.cracks_per_second,
            average_case_divisor: self.average_case_divisor,
        }
    }

    #[must_use]
    pub const fn thresholds(&self) -> StrengthThresholds {
        StrengthThresholds {
            weak_below_days: self.weak_below_days,
            strong_from_days: self.strong_from_days,
        }
    }

    /// Estimator for property strength.
    ///
    /// The dictionary checker is attached when `dictionary_file` loads; a
    /// failure is logged and the estimator falls back to the fast checker.
    #[must_use]
    pub fn strength_estimator(&self) -> StrengthEstimator {
        let estimator = StrengthEstimator::new(self.crack_model(), self.thresholds());
        let Some(path) = &self.dictionary_file else {
            return estimator;
        };
        match DictionaryChecker::load(path, self.crack_model()) {
            Ok(checker) => estimator.with_slow_checker(Box::new(checker)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "dictionary not loaded");
                estimator
            }
        }
    }

    #[must_use]
    pub const fn master_password_checker(&self) -> MasterPasswordChecker {
        MasterPasswordChecker::new(self.min_master_password_length)
    }

    /// The configured password generator.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] with `InvalidArgument` for an unknown
    /// generator type or a missing external program.
    pub fn password_generator(&self) -> Result<Box<dyn PasswordGenerator>, VaultError> {
        Ok(get_generator(&self.generator, &self.external_generator)?)
    }

    /// Idle time before auto-logout, if enabled.
    #[must_use]
    pub fn auto_logout(&self) -> Option<Duration> {
        (self.auto_logout_minutes > 0)
            .then(|| Duration::from_secs(u64::from(self.auto_logout_minutes).saturating_mul(60)))
    }
}

// ── File I/O ───────────────────────────────────────────────────────

const SETTINGS_FILE: &str = "settings.json";

impl Settings {
    /// Load settings from `{data_dir}/settings.json`.
    ///
    /// Returns [`Default::default()`] when the file is missing or
    /// contains invalid JSON.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| {
                serde_json::from_str(&contents).unwrap_or_else(|e| {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "settings unreadable, using defaults"
                    );
                    Self::default()
                })
            },
        )
    }

    /// Persist settings to `{data_dir}/settings.json`.
    ///
    /// Writes to `.settings.json.tmp` and renames it into place.
    ///
    /// # Errors
    ///
    /// [`VaultError::Settings`] if serialization fails, [`VaultError::Io`]
    /// if the directory does not exist or the write/rename is rejected.
    pub fn save(&self, data_dir: &Path) -> Result<(), VaultError> {
        let path = data_dir.join(SETTINGS_FILE);
        let tmp = data_dir.join(".settings.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Settings(e.to_string()))?;

        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)?;

        Ok(())
    }
}

// ── Settings pages ─────────────────────────────────────────────────

/// A view-model for one page of the settings dialog.
///
/// The GUI binds widgets to the page's fields; the page moves values from
/// and to [`Settings`].
pub trait SettingsPage {
    fn fill_from_config(&mut self, settings: &Settings);
    fn apply_to_config(&self, settings: &mut Settings);
}

/// Password generation and strength display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PasswordPage {
    pub generator: String,
    pub external_generator: String,
    pub password_length: usize,
    pub weak_below_days: f64,
    pub strong_from_days: f64,
    pub cracks_per_second: f64,
    pub dictionary_file: Option<PathBuf>,
}

impl SettingsPage for PasswordPage {
    fn fill_from_config(&mut self, settings: &Settings) {
        self.generator.clone_from(&settings.generator);
        self.external_generator.clone_from(&settings.external_generator);
        self.password_length = settings.password_length;
        self.weak_below_days = settings.weak_below_days;
        self.strong_from_days = settings.strong_from_days;
        self.cracks_per_second = settings.cracks_per_second;
        self.dictionary_file.clone_from(&settings.dictionary_file);
    }

    fn apply_to_config(&self, settings: &mut Settings) {
        settings.generator.clone_from(&self.generator);
        settings.external_generator.clone_from(&self.external_generator);
        settings.password_length = self.password_length;
        settings.weak_below_days = self.weak_below_days;
        settings.strong_from_days = self.strong_from_days;
        settings.cracks_per_second = self.cracks_per_second;
        settings.dictionary_file.clone_from(&self.dictionary_file);
    }
}

/// Encryption, master password and session behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityPage {
    pub encryption_enabled: bool,
    pub min_master_password_length: usize,
    pub auto_logout_minutes: u32,
    pub keep_backup: bool,
}

impl SettingsPage for SecurityPage {
    fn fill_from_config(&mut self, settings: &Settings) {
        self.encryption_enabled = settings.encryption_enabled;
        self.min_master_password_length = settings.min_master_password_length;
        self.auto_logout_minutes = settings.auto_logout_minutes;
        self.keep_backup = settings.keep_backup;
    }

    fn apply_to_config(&self, settings: &mut Settings) {
        settings.encryption_enabled = self.encryption_enabled;
        settings.min_master_password_length = self.min_master_password_length;
        settings.auto_logout_minutes = self.auto_logout_minutes;
        settings.keep_backup = self.keep_backup;
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use coffre_crypto_core::PasswordStrength;
    use tempfile::TempDir;

    #[test]
    fn default_values_are_correct() {
        let s = Settings::default();
        assert!(s.encryption_enabled);
        assert!(s.keep_backup);
        assert_eq!(s.generator, "RANDOM");
        assert_eq!(s.min_master_password_length, 6);
        assert_eq!(s.password_length, 20);
        assert!((s.average_case_divisor - 2.0).abs() < f64::EPSILON);
        assert!(s.auto_logout().is_none());
        s.validate().unwrap();
    }

    #[test]
    fn load_returns_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Settings::load(dir.path()), Settings::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let s = Settings {
            datafile: Some(dir.path().join("passwords.xml")),
            generator: "EXTERNAL".into(),
            external_generator: "/usr/bin/pwgen".into(),
            auto_logout_minutes: 5,
            ..Settings::default()
        };
        s.save(dir.path()).unwrap();
        assert_eq!(Settings::load(dir.path()), s);
        assert!(!dir.path().join(".settings.json.tmp").exists());
    }

    #[test]
    fn load_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE), "{ nope").unwrap();
        assert_eq!(Settings::load(dir.path()), Settings::default());
    }

    #[test]
    fn load_handles_partial_json_with_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"passwordLength":32,"encryptionEnabled":false}"#,
        )
        .unwrap();
        let s = Settings::load(dir.path());
        assert_eq!(s.password_length, 32);
        assert!(!s.encryption_enabled);
        assert!(s.keep_backup);
        assert_eq!(s.generator, "RANDOM");
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("encryptionEnabled"));
        assert!(json.contains("weakBelowDays"));
        assert!(!json.contains("weak_below_days"));
    }

    #[test]
    fn validate_rejects_nonsense() {
        let bad = [
            Settings {
                cracks_per_second: 0.0,
                ..Settings::default()
            },
            Settings {
                average_case_divisor: -1.0,
                ..Settings::default()
            },
            Settings {
                weak_below_days: 10_000.0,
                ..Settings::default()
            },
            Settings {
                password_length: 0,
                ..Settings::default()
            },
            Settings {
                generator: "BOGUS".into(),
                ..Settings::default()
            },
            Settings {
                kdf: Argon2idParams {
                    t_cost: coffre_crypto_core::MAX_T_COST + 1,
                    ..Argon2idParams::default()
                },
                ..Settings::default()
            },
        ];
        for s in bad {
            assert!(matches!(s.validate(), Err(VaultError::InvalidArgument(_))));
        }
    }

    #[test]
    fn estimator_follows_thresholds() {
        let s = Settings {
            weak_below_days: 0.0,
            strong_from_days: 0.0,
            ..Settings::default()
        };
        assert_eq!(
            s.strength_estimator().evaluate("a").strength,
            PasswordStrength::Strong
        );
    }

    #[test]
    fn missing_dictionary_falls_back_to_fast_checker() {
        let s = Settings {
            dictionary_file: Some(PathBuf::from("/nonexistent/words.txt")),
            ..Settings::default()
        };
        assert!(!s.strength_estimator().has_slow_checker());
    }

    #[test]
    fn dictionary_file_attaches_slow_checker() {
        let dir = TempDir::new().unwrap();
        let words = dir.path().join("words.txt");
        fs::write(&words, "password\ndragon\n").unwrap();
        let s = Settings {
            dictionary_file: Some(words),
            ..Settings::default()
        };
        assert!(s.strength_estimator().has_slow_checker());
    }

    #[test]
    fn unknown_generator_is_rejected() {
        let s = Settings {
            generator: "BOGUS".into(),
            ..Settings::default()
        };
        assert!(s.password_generator().is_err());
        let p = Settings::default().password_generator().unwrap();
        assert_eq!(p.get_password(12).unwrap().chars().count(), 12);
    }

    #[test]
    fn pages_roundtrip_through_settings() {
        let source = Settings {
            password_length: 42,
            auto_logout_minutes: 7,
            encryption_enabled: false,
            ..Settings::default()
        };
        let mut pw = PasswordPage::default();
        let mut sec = SecurityPage::default();
        pw.fill_from_config(&source);
        sec.fill_from_config(&source);
        assert_eq!(pw.password_length, 42);
        assert_eq!(sec.auto_logout_minutes, 7);

        let mut target = Settings::default();
        pw.apply_to_config(&mut target);
        sec.apply_to_config(&mut target);
        assert_eq!(target, source);
    }
}
