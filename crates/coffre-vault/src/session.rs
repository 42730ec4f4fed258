//! The open document and everything held in memory while it is open.
//!
//! A [`Session`] owns the tree, the derived key and the master password.
//! [`Session::logout`] drops all three; the password and key are zeroized on
//! drop.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use coffre_crypto_core::{constant_time_eq, generate_salt};
use tracing::info;
use zeroize::Zeroizing;

use crate::document::load::{LoadMachine, LoadOutcome, RetryDecision};
use crate::document::writer::save_document;
use crate::document::DocumentCipher;
use crate::error::VaultError;
use crate::failure::ReadWriteFailure;
use crate::settings::Settings;
use crate::tree::PasswordTree;

struct OpenDocument {
    path: PathBuf,
    tree: PasswordTree,
    cipher: DocumentCipher,
    password: Zeroizing<String>,
}

/// Holds at most one open document.
pub struct Session {
    document: Option<OpenDocument>,
    modified: Rc<Cell<bool>>,
    last_activity: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path())
            .field("modified", &self.modified.get())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session with nothing open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            document: None,
            modified: Rc::new(Cell::new(false)),
            last_activity: Instant::now(),
        }
    }

    /// Start a new, empty document to be saved at `path`.
    ///
    /// With encryption enabled a fresh salt is drawn and the key derived
    /// from `password`; otherwise `password` is ignored.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidArgument`] if `password` is not admissible
    /// - [`VaultError::Crypto`] if no salt can be drawn or derivation fails
    pub fn create(
        &mut self,
        path: &Path,
        password: &str,
        settings: &Settings,
    ) -> Result<(), VaultError> {
        let cipher = if settings.encryption_enabled {
            if !settings.master_password_checker().is_password_ok(password) {
                return Err(VaultError::InvalidArgument(
                    "master password does not meet the requirements".into(),
                ));
            }
            let salt = generate_salt()?;
            DocumentCipher::derive(password, &salt, &settings.kdf)?
        } else {
            DocumentCipher::plain()
        };

        let tree = PasswordTree::new(settings.strength_estimator());
        self.install(
            path.to_path_buf(),
            tree,
            cipher,
            Zeroizing::new(password.to_string()),
        );
        self.modified.set(true);
        info!(path = %path.display(), scheme = %self.cipher_scheme(), "new document created");
        Ok(())
    }

    /// Load the document at `path` through the load state machine.
    ///
    /// Returns `Ok(false)` if the user cancelled; the session is then
    /// unchanged.
    ///
    /// # Errors
    ///
    /// The terminal [`ReadWriteFailure`] of the load.
    pub fn open<P, F>(
        &mut self,
        path: &Path,
        settings: &Settings,
        prompt: P,
        on_failure: F,
    ) -> Result<bool, ReadWriteFailure>
    where
        P: FnMut(u32) -> Option<Zeroizing<String>>,
        F: FnMut(&ReadWriteFailure) -> RetryDecision,
    {
        match LoadMachine::new(path, settings).run(prompt, on_failure) {
            LoadOutcome::Loaded(loaded) => {
                let from_backup = loaded.from_backup;
                self.install(loaded.path, loaded.tree, loaded.cipher, loaded.password);
                // Content recovered from the backup differs from the file on disk.
                self.modified.set(from_backup);
                Ok(true)
            }
            LoadOutcome::Failed(failure) => Err(failure),
            LoadOutcome::Aborted => Ok(false),
        }
    }

    /// Save to the current path.
    ///
    /// # Errors
    ///
    /// A [`ReadWriteFailure`]; the session keeps the document and its key,
    /// so the save can be retried.
    pub fn save(&mut self, settings: &Settings) -> Result<(), ReadWriteFailure> {
        let doc = self.document.as_ref().ok_or_else(not_open)?;
        save_document(&doc.path, &doc.tree, &doc.cipher, settings.keep_backup)?;
        self.modified.set(false);
        self.touch();
        Ok(())
    }

    /// Save to `path` and make it the current path.
    ///
    /// # Errors
    ///
    /// See [`Self::save`]. On failure the current path is unchanged.
    pub fn save_as(&mut self, path: &Path, settings: &Settings) -> Result<(), ReadWriteFailure> {
        let doc = self.document.as_mut().ok_or_else(not_open)?;
        save_document(path, &doc.tree, &doc.cipher, settings.keep_backup)?;
        doc.path = path.to_path_buf();
        self.modified.set(false);
        self.touch();
        Ok(())
    }

    /// Drop the tree, the key and the master password.
    pub fn logout(&mut self) {
        if let Some(doc) = self.document.take() {
            info!(path = %doc.path.display(), "logged out");
        }
        self.modified.set(false);
    }

    /// Replace the master password and re-key the document.
    ///
    /// A new salt is drawn. The document stays modified until saved.
    ///
    /// # Errors
    ///
    /// - [`VaultError::NotOpen`] if nothing is open
    /// - [`VaultError::WrongPassword`] if `current` does not match
    /// - [`VaultError::InvalidArgument`] if `new` is not admissible
    /// - [`VaultError::Crypto`] if no salt can be drawn or derivation fails
    pub fn change_master_password(
        &mut self,
        settings: &Settings,
        current: &str,
        new: &str,
    ) -> Result<(), VaultError> {
        let doc = self.document.as_mut().ok_or(VaultError::NotOpen)?;
        if !constant_time_eq(doc.password.as_bytes(), current.as_bytes()) {
            return Err(VaultError::WrongPassword);
        }
        if !settings.master_password_checker().is_password_ok(new) {
            return Err(VaultError::InvalidArgument(
                "master password does not meet the requirements".into(),
            ));
        }
        let salt = generate_salt()?;
        doc.cipher = DocumentCipher::derive(new, &salt, &settings.kdf)?;
        doc.password = Zeroizing::new(new.to_string());
        info!(path = %doc.path.display(), "master password changed");
        self.modified.set(true);
        self.touch();
        Ok(())
    }

    /// Apply changed strength settings to every password property.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotOpen`] if nothing is open.
    pub fn apply_settings(&mut self, settings: &Settings) -> Result<(), VaultError> {
        self.tree_mut()?.set_estimator(settings.strength_estimator());
        Ok(())
    }

    /// Generate a password with the configured generator and length.
    ///
    /// # Errors
    ///
    /// Propagates generator construction and generation failures.
    pub fn generate_password(
        &self,
        settings: &Settings,
    ) -> Result<Zeroizing<String>, VaultError> {
        let generator = settings.password_generator()?;
        Ok(Zeroizing::new(
            generator.get_password(settings.password_length)?,
        ))
    }

    /// Record user activity for the idle timer.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// `true` when auto-logout is enabled and no activity was recorded for
    /// at least the configured time before `now`.
    #[must_use]
    pub fn idle_expired(&self, now: Instant, settings: &Settings) -> bool {
        self.is_open()
            && settings
                .auto_logout()
                .is_some_and(|limit| now.saturating_duration_since(self.last_activity) >= limit)
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.document.is_some()
    }

    /// `true` if the document changed since it was loaded or saved.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.is_open() && self.modified.get()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.path.as_path())
    }

    /// # Errors
    ///
    /// [`VaultError::NotOpen`] if nothing is open.
    pub fn tree(&self) -> Result<&PasswordTree, VaultError> {
        self.document.as_ref().map(|d| &d.tree).ok_or(VaultError::NotOpen)
    }

    /// Mutable access to the tree. Counts as user activity.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotOpen`] if nothing is open.
    pub fn tree_mut(&mut self) -> Result<&mut PasswordTree, VaultError> {
        self.last_activity = Instant::now();
        self.document
            .as_mut()
            .map(|d| &mut d.tree)
            .ok_or(VaultError::NotOpen)
    }

    fn install(
        &mut self,
        path: PathBuf,
        mut tree: PasswordTree,
        cipher: DocumentCipher,
        password: Zeroizing<String>,
    ) {
        let flag = Rc::clone(&self.modified);
        tree.subscribe(move |event| {
            if event.modifies_document() {
                flag.set(true);
            }
        });
        self.document = Some(OpenDocument {
            path,
            tree,
            cipher,
            password,
        });
        self.touch();
    }

    fn cipher_scheme(&self) -> &'static str {
        self.document
            .as_ref()
            .map_or("", |d| d.cipher.scheme().as_str())
    }
}

fn not_open() -> ReadWriteFailure {
    ReadWriteFailure::from_save_error(&VaultError::NotOpen, Path::new(""))
}
