//! Password strength estimation.
//!
//! Strength is an estimate of how long an exhaustive search takes:
//!
//! ```text
//! bits = length * log2(alphabet)
//! days = 2^bits / divisor / cracks_per_second / 86400
//! ```
//!
//! where `alphabet` is the sum of the sizes of the character classes that
//! actually occur in the password. The result is bucketed into
//! [`PasswordStrength`] with two thresholds expressed in days.
//!
//! [`EntropyChecker`] is cheap enough for every keystroke. [`DictionaryChecker`]
//! reports itself as slow and only runs through
//! [`StrengthEstimator::evaluate_thorough`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::CryptoError;

/// Seconds in one day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Default attacker guess rate.
pub const DEFAULT_CRACKS_PER_SECOND: f64 = 1e9;

/// Default average-case divisor (the key is found after half the space).
pub const DEFAULT_AVERAGE_CASE_DIVISOR: f64 = 2.0;

/// Default upper bound (exclusive) of the `Weak` bucket, in days.
pub const DEFAULT_WEAK_BELOW_DAYS: f64 = 30.0;

/// Default lower bound (inclusive) of the `Strong` bucket, in days.
pub const DEFAULT_STRONG_FROM_DAYS: f64 = 3650.0;

const LOWERCASE_SIZE: u32 = 26;
const UPPERCASE_SIZE: u32 = 26;
const DIGIT_SIZE: u32 = 10;
const OTHER_SIZE: u32 = 33;

/// Dictionary words shorter than this are ignored.
const MIN_DICTIONARY_WORD_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Strength bucket of a password.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PasswordStrength {
    /// Estimated crack time below the weak threshold.
    Weak,
    /// Between the two thresholds.
    Acceptable,
    /// At or above the strong threshold.
    Strong,
    /// Not evaluated (or not a password).
    #[default]
    Undefined,
}

impl PasswordStrength {
    /// Human-readable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Acceptable => "acceptable",
            Self::Strong => "strong",
            Self::Undefined => "undefined",
        }
    }
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Character classes present in a password.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CharacterClasses {
    pub lowercase: bool,
    pub uppercase: bool,
    pub digit: bool,
    pub other: bool,
}

impl CharacterClasses {
    /// Detect which classes occur in `password`.
    #[must_use]
    pub fn of(password: &str) -> Self {
        let mut classes = Self::default();
        for c in password.chars() {
            if c.is_lowercase() {
                classes.lowercase = true;
            } else if c.is_uppercase() {
                classes.uppercase = true;
            } else if c.is_ascii_digit() {
                classes.digit = true;
            } else {
                classes.other = true;
            }
        }
        classes
    }

    /// Size of the effective alphabet.
    #[must_use]
    pub const fn alphabet_size(self) -> u32 {
        let mut size = 0u32;
        if self.lowercase {
            size = size.saturating_add(LOWERCASE_SIZE);
        }
        if self.uppercase {
            size = size.saturating_add(UPPERCASE_SIZE);
        }
        if self.digit {
            size = size.saturating_add(DIGIT_SIZE);
        }
        if self.other {
            size = size.saturating_add(OTHER_SIZE);
        }
        size
    }
}

/// `length * log2(alphabet)`; `0.0` for the empty password.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_entropy_bits(password: &str) -> f64 {
    let alphabet = CharacterClasses::of(password).alphabet_size();
    if alphabet == 0 {
        return 0.0;
    }
    let length = password.chars().count() as f64;
    length * f64::from(alphabet).log2()
}

/// Attacker model turning entropy into an expected crack time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrackModel {
    /// Guesses per second.
    pub cracks_per_second: f64,
    /// Fraction of the search space covered on average (2.0 = half).
    pub average_case_divisor: f64,
}

impl Default for CrackModel {
    fn default() -> Self {
        Self {
            cracks_per_second: DEFAULT_CRACKS_PER_SECOND,
            average_case_divisor: DEFAULT_AVERAGE_CASE_DIVISOR,
        }
    }
}

impl CrackModel {
    /// Expected days to exhaust `bits` of entropy.
    ///
    /// Saturates to `f64::INFINITY` for very large entropies.
    #[must_use]
    pub fn days_for_bits(&self, bits: f64) -> f64 {
        2f64.powf(bits) / self.average_case_divisor / self.cracks_per_second / SECONDS_PER_DAY
    }

    /// Expected days to crack `password` by exhaustive search.
    #[must_use]
    pub fn days_to_crack(&self, password: &str) -> f64 {
        self.days_for_bits(estimate_entropy_bits(password))
    }
}

/// The two bucket boundaries, in days.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrengthThresholds {
    pub weak_below_days: f64,
    pub strong_from_days: f64,
}

impl Default for StrengthThresholds {
    fn default() -> Self {
        Self {
            weak_below_days: DEFAULT_WEAK_BELOW_DAYS,
            strong_from_days: DEFAULT_STRONG_FROM_DAYS,
        }
    }
}

impl StrengthThresholds {
    /// Bucket an estimated crack time.
    #[must_use]
    pub fn classify(&self, days_to_crack: f64) -> PasswordStrength {
        if days_to_crack < self.weak_below_days {
            PasswordStrength::Weak
        } else if days_to_crack >= self.strong_from_days {
            PasswordStrength::Strong
        } else {
            PasswordStrength::Acceptable
        }
    }
}

// ---------------------------------------------------------------------------
// Checkers
// ---------------------------------------------------------------------------

/// What a checker requires of a password and how expensive it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CheckerConstraints {
    pub min_length: usize,
    pub requires_uppercase: bool,
    pub requires_lowercase: bool,
    pub requires_non_letter: bool,
    /// Too expensive to run on every keystroke.
    pub slow: bool,
}

/// Result of a quality check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PasswordQuality {
    pub entropy_bits: f64,
    pub days_to_crack: f64,
}

/// A password quality estimator.
pub trait PasswordChecker {
    /// Static description of this checker.
    fn constraints(&self) -> CheckerConstraints;

    /// Estimate the quality of `password`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::PasswordCheck` if the checker cannot evaluate.
    fn password_quality(&self, password: &str) -> Result<PasswordQuality, CryptoError>;
}

/// Character-class entropy checker. Fast.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntropyChecker {
    model: CrackModel,
}

impl EntropyChecker {
    #[must_use]
    pub const fn new(model: CrackModel) -> Self {
        Self { model }
    }

    /// Infallible form of [`PasswordChecker::password_quality`].
    #[must_use]
    pub fn quality(&self, password: &str) -> PasswordQuality {
        let entropy_bits = estimate_entropy_bits(password);
        PasswordQuality {
            entropy_bits,
            days_to_crack: self.model.days_for_bits(entropy_bits),
        }
    }
}

impl PasswordChecker for EntropyChecker {
    fn constraints(&self) -> CheckerConstraints {
        CheckerConstraints::default()
    }

    fn password_quality(&self, password: &str) -> Result<PasswordQuality, CryptoError> {
        Ok(self.quality(password))
    }
}

/// Word-list checker.
///
/// Each dictionary word found in the password (case-insensitive, longest
/// match first) counts as a single symbol drawn from the dictionary instead
/// of one symbol per character.
#[derive(Clone, Debug)]
pub struct DictionaryChecker {
    /// Lowercased words, longest first.
    words: Vec<Vec<char>>,
    model: CrackModel,
}

impl DictionaryChecker {
    /// Build from an in-memory word list.
    pub fn from_words<I, S>(words: I, model: CrackModel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| w.chars().count() >= MIN_DICTIONARY_WORD_LEN)
            .collect();
        let mut words: Vec<Vec<char>> = unique.iter().map(|w| w.chars().collect()).collect();
        words.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { words, model }
    }

    /// Load a newline-separated word list.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::PasswordCheck` if the file cannot be read.
    pub fn load(path: &Path, model: CrackModel) -> Result<Self, CryptoError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CryptoError::PasswordCheck(format!("cannot read dictionary {}: {e}", path.display()))
        })?;
        Ok(Self::from_words(contents.lines(), model))
    }

    /// Number of usable words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Split `password` into (plain characters, dictionary hits).
    fn tokenize(&self, password: &str) -> (usize, usize) {
        let lowered: Vec<char> = password.to_lowercase().chars().collect();
        let mut plain = 0usize;
        let mut hits = 0usize;
        let mut pos = 0usize;
        while let Some(rest) = lowered.get(pos..) {
            if rest.is_empty() {
                break;
            }
            let matched = self
                .words
                .iter()
                .find(|w| rest.starts_with(w.as_slice()))
                .map_or(0, Vec::len);
            if matched > 0 {
                hits = hits.saturating_add(1);
                pos = pos.saturating_add(matched);
            } else {
                plain = plain.saturating_add(1);
                pos = pos.saturating_add(1);
            }
        }
        (plain, hits)
    }
}

impl PasswordChecker for DictionaryChecker {
    fn constraints(&self) -> CheckerConstraints {
        CheckerConstraints {
            slow: true,
            ..CheckerConstraints::default()
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn password_quality(&self, password: &str) -> Result<PasswordQuality, CryptoError> {
        let alphabet = CharacterClasses::of(password).alphabet_size();
        if alphabet == 0 {
            return Ok(PasswordQuality {
                entropy_bits: 0.0,
                days_to_crack: self.model.days_for_bits(0.0),
            });
        }
        let (plain, hits) = self.tokenize(password);
        let per_char = f64::from(alphabet).log2();
        let per_word = (self.words.len().max(1) as f64).log2();
        let entropy_bits = (plain as f64) * per_char + (hits as f64) * per_word;
        Ok(PasswordQuality {
            entropy_bits,
            days_to_crack: self.model.days_for_bits(entropy_bits),
        })
    }
}

/// Admissibility predicate for the master password.
///
/// Not entropy based: a password is accepted when it is long enough and
/// contains an uppercase letter, a lowercase letter and a non-letter.
#[derive(Clone, Copy, Debug)]
pub struct MasterPasswordChecker {
    min_length: usize,
}

impl Default for MasterPasswordChecker {
    fn default() -> Self {
        Self {
            min_length: Self::DEFAULT_MIN_LENGTH,
        }
    }
}

impl MasterPasswordChecker {
    pub const DEFAULT_MIN_LENGTH: usize = 6;

    #[must_use]
    pub const fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    #[must_use]
    pub const fn constraints(&self) -> CheckerConstraints {
        CheckerConstraints {
            min_length: self.min_length,
            requires_uppercase: true,
            requires_lowercase: true,
            requires_non_letter: true,
            slow: false,
        }
    }

    /// `true` if `password` is acceptable as a master password.
    #[must_use]
    pub fn is_password_ok(&self, password: &str) -> bool {
        if password.chars().count() < self.min_length {
            return false;
        }
        let mut uppercase = false;
        let mut lowercase = false;
        let mut non_letter = false;
        for c in password.chars() {
            if c.is_uppercase() {
                uppercase = true;
            } else if c.is_lowercase() {
                lowercase = true;
            } else if !c.is_alphabetic() {
                non_letter = true;
            }
        }
        uppercase && lowercase && non_letter
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

/// Cached result of an evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrengthReport {
    pub strength: PasswordStrength,
    pub days_to_crack: f64,
}

impl Default for StrengthReport {
    fn default() -> Self {
        Self {
            strength: PasswordStrength::Undefined,
            days_to_crack: 0.0,
        }
    }
}

/// Combines a fast checker, an optional slow one and the thresholds.
pub struct StrengthEstimator {
    fast: EntropyChecker,
    slow: Option<Box<dyn PasswordChecker>>,
    thresholds: StrengthThresholds,
}

impl Default for StrengthEstimator {
    fn default() -> Self {
        Self::new(CrackModel::default(), StrengthThresholds::default())
    }
}

impl fmt::Debug for StrengthEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrengthEstimator")
            .field("fast", &self.fast)
            .field("has_slow", &self.slow.is_some())
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

impl StrengthEstimator {
    #[must_use]
    pub const fn new(model: CrackModel, thresholds: StrengthThresholds) -> Self {
        Self {
            fast: EntropyChecker::new(model),
            slow: None,
            thresholds,
        }
    }

    /// Attach an on-demand checker used by [`Self::evaluate_thorough`].
    #[must_use]
    pub fn with_slow_checker(mut self, checker: Box<dyn PasswordChecker>) -> Self {
        self.slow = Some(checker);
        self
    }

    #[must_use]
    pub const fn thresholds(&self) -> &StrengthThresholds {
        &self.thresholds
    }

    #[must_use]
    pub fn has_slow_checker(&self) -> bool {
        self.slow.is_some()
    }

    /// Evaluate with the fast checker only. Safe on every keystroke.
    #[must_use]
    pub fn evaluate(&self, password: &str) -> StrengthReport {
        self.report(self.fast.quality(password))
    }

    /// Evaluate with the slow checker when one is configured, otherwise
    /// identical to [`Self::evaluate`].
    ///
    /// # Errors
    ///
    /// Propagates the slow checker's failure.
    pub fn evaluate_thorough(&self, password: &str) -> Result<StrengthReport, CryptoError> {
        match &self.slow {
            Some(checker) => Ok(self.report(checker.password_quality(password)?)),
            None => Ok(self.evaluate(password)),
        }
    }

    fn report(&self, quality: PasswordQuality) -> StrengthReport {
        StrengthReport {
            strength: self.thresholds.classify(quality.days_to_crack),
            days_to_crack: quality.days_to_crack,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
