//! The document load state machine.
//!
//! ```text
//! PromptPassword -> Attempting -> Success
//!                             \-> RetryableFailure --retry--> PromptPassword (wrong password)
//!                              |                           \-> Attempting (backup)
//!                              \-> FatalFailure
//! any prompt or retry choice --cancel--> Abort
//! ```
//!
//! The caller drives the machine, either step by step or through
//! [`LoadMachine::run`] with a prompt and a failure callback.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zeroize::Zeroizing;

use super::reader::{parse_file, ParsedDocument};
use super::writer::backup_path;
use super::DocumentCipher;
use crate::error::VaultError;
use crate::failure::{FailureCategory, ReadWriteFailure};
use crate::settings::Settings;
use crate::tree::PasswordTree;

/// Where the load currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    PromptPassword,
    Attempting,
    Success,
    RetryableFailure(ReadWriteFailure),
    FatalFailure(ReadWriteFailure),
    /// User cancellation. Terminal, and not an error.
    Abort,
}

impl LoadState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::FatalFailure(_) | Self::Abort)
    }
}

/// What the caller decided after a retryable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Abort,
}

/// A successfully opened document.
pub struct LoadedDocument {
    pub tree: PasswordTree,
    pub cipher: DocumentCipher,
    /// The document path, even when the content came from the backup.
    pub path: PathBuf,
    pub password: Zeroizing<String>,
    pub from_backup: bool,
}

impl fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("tree", &self.tree)
            .field("cipher", &self.cipher)
            .field("path", &self.path)
            .field("from_backup", &self.from_backup)
            .finish_non_exhaustive()
    }
}

/// Final result of [`LoadMachine::run`].
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(LoadedDocument),
    Failed(ReadWriteFailure),
    Aborted,
}

/// Drives one load of a document, including re-prompts and the backup path.
pub struct LoadMachine<'a> {
    path: PathBuf,
    settings: &'a Settings,
    state: LoadState,
    using_backup: bool,
    parsed: Option<ParsedDocument>,
    password: Option<Zeroizing<String>>,
    prompts: u32,
    /// Empty tree carrying the estimator, built once and reused across
    /// attempts.
    scratch: Option<PasswordTree>,
    loaded: Option<(PasswordTree, DocumentCipher)>,
}

impl<'a> LoadMachine<'a> {
    #[must_use]
    pub fn new(path: &Path, settings: &'a Settings) -> Self {
        Self {
            path: path.to_path_buf(),
            settings,
            state: LoadState::PromptPassword,
            using_backup: false,
            parsed: None,
            password: None,
            prompts: 0,
            scratch: None,
            loaded: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &LoadState {
        &self.state
    }

    /// The file currently being read: the document or its backup.
    #[must_use]
    pub fn source(&self) -> PathBuf {
        if self.using_backup {
            backup_path(&self.path)
        } else {
            self.path.clone()
        }
    }

    #[must_use]
    pub const fn is_using_backup(&self) -> bool {
        self.using_backup
    }

    /// Whether the current source must be unlocked with a password.
    ///
    /// Reads the file on first call. If that fails, the machine moves to the
    /// matching failure state and this returns `false`.
    pub fn password_required(&mut self) -> bool {
        self.ensure_parsed()
            && self
                .parsed
                .as_ref()
                .is_some_and(ParsedDocument::needs_password)
    }

    /// Provide the candidate password. Only valid in `PromptPassword`.
    pub fn supply_password(&mut self, password: Zeroizing<String>) -> bool {
        if self.state != LoadState::PromptPassword {
            return false;
        }
        self.prompts = self.prompts.saturating_add(1);
        self.password = Some(password);
        self.state = LoadState::Attempting;
        true
    }

    /// Cancel at a prompt or after a retryable failure.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            LoadState::PromptPassword | LoadState::RetryableFailure(_) => {
                self.password = None;
                self.state = LoadState::Abort;
                info!(path = %self.path.display(), "document load cancelled");
                true
            }
            _ => false,
        }
    }

    /// Read, unlock and rebuild the current source. Only valid in `Attempting`.
    pub fn attempt(&mut self) -> &LoadState {
        if self.state != LoadState::Attempting || !self.ensure_parsed() {
            return &self.state;
        }
        let Some(parsed) = self.parsed.as_ref() else {
            return &self.state;
        };
        let password = self.password.as_ref().map_or("", |p| p.as_str());
        let settings = self.settings;
        let mut tree = self
            .scratch
            .take()
            .unwrap_or_else(|| PasswordTree::new(settings.strength_estimator()));

        let result = match parsed.unlock(password) {
            Ok(cipher) => match parsed.fill_tree(&mut tree, &cipher) {
                Ok(()) => Ok((tree, cipher)),
                Err(e) => {
                    tree.clear();
                    self.scratch = Some(tree);
                    Err(e)
                }
            },
            Err(e) => {
                self.scratch = Some(tree);
                Err(e)
            }
        };

        match result {
            Ok(loaded) => {
                info!(
                    path = %self.source().display(),
                    nodes = loaded.0.node_count(),
                    from_backup = self.using_backup,
                    "document loaded"
                );
                self.loaded = Some(loaded);
                self.state = LoadState::Success;
            }
            Err(e) => self.fail(&e),
        }
        &self.state
    }

    /// Act on a retryable failure: re-prompt after a wrong password, switch
    /// to the backup after corruption.
    pub fn retry(&mut self) -> bool {
        let category = match &self.state {
            LoadState::RetryableFailure(failure) => failure.category,
            _ => return false,
        };
        match category {
            FailureCategory::WrongPassword => {
                self.password = None;
                self.state = LoadState::PromptPassword;
            }
            FailureCategory::Corrupt => {
                self.using_backup = true;
                self.parsed = None;
                self.state = if self.password.is_some() {
                    LoadState::Attempting
                } else {
                    LoadState::PromptPassword
                };
                info!(backup = %self.source().display(), "retrying from backup");
            }
            _ => self.state = LoadState::Attempting,
        }
        true
    }

    /// Consume a machine in `Success` state.
    #[must_use]
    pub fn into_loaded(self) -> Option<LoadedDocument> {
        if self.state != LoadState::Success {
            return None;
        }
        let (tree, cipher) = self.loaded?;
        Some(LoadedDocument {
            tree,
            cipher,
            path: self.path,
            password: self.password.unwrap_or_default(),
            from_backup: self.using_backup,
        })
    }

    /// Drive the machine to a terminal state.
    ///
    /// `prompt` receives the number of prompts so far and returns `None` to
    /// cancel. It is not called for unencrypted documents. `on_failure`
    /// decides what happens after a retryable failure.
    pub fn run<P, F>(mut self, mut prompt: P, mut on_failure: F) -> LoadOutcome
    where
        P: FnMut(u32) -> Option<Zeroizing<String>>,
        F: FnMut(&ReadWriteFailure) -> RetryDecision,
    {
        loop {
            match &self.state {
                LoadState::PromptPassword => {
                    if self.password_required() {
                        match prompt(self.prompts) {
                            Some(password) => self.supply_password(password),
                            None => self.cancel(),
                        };
                    } else if self.state == LoadState::PromptPassword {
                        self.supply_password(Zeroizing::new(String::new()));
                    }
                }
                LoadState::Attempting => {
                    self.attempt();
                }
                LoadState::RetryableFailure(failure) => match on_failure(failure) {
                    RetryDecision::Retry => {
                        self.retry();
                    }
                    RetryDecision::Abort => {
                        self.cancel();
                    }
                },
                LoadState::FatalFailure(failure) => return LoadOutcome::Failed(failure.clone()),
                LoadState::Abort => return LoadOutcome::Aborted,
                LoadState::Success => {
                    return self.into_loaded().map_or_else(
                        || {
                            LoadOutcome::Failed(ReadWriteFailure::from_load_error(
                                &VaultError::NotOpen,
                                Path::new(""),
                                false,
                            ))
                        },
                        LoadOutcome::Loaded,
                    )
                }
            }
        }
    }

    fn ensure_parsed(&mut self) -> bool {
        if self.parsed.is_some() {
            return true;
        }
        match parse_file(&self.source()) {
            Ok(parsed) => {
                self.parsed = Some(parsed);
                true
            }
            Err(e) => {
                self.fail(&e);
                false
            }
        }
    }

    fn backup_available(&self) -> bool {
        !self.using_backup && backup_path(&self.path).is_file()
    }

    fn fail(&mut self, err: &VaultError) {
        let failure =
            ReadWriteFailure::from_load_error(err, &self.source(), self.backup_available());
        warn!(
            path = %self.source().display(),
            category = %failure.category,
            retry = failure.retry_is_meaningful,
            "document load failed"
        );
        self.state = if failure.retry_is_meaningful {
            LoadState::RetryableFailure(failure)
        } else {
            LoadState::FatalFailure(failure)
        };
    }
}
