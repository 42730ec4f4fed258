//! `coffre-vault`: Password document model and persistence for Coffre.
//!
//! Holds the password tree, reads and writes the encrypted XML document,
//! drives the load/retry state machine and keeps the open session.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod failure;

pub mod property;
pub mod tree;

pub mod document;

pub mod settings;

pub mod session;

pub mod export;

pub use document::load::{LoadMachine, LoadOutcome, LoadState, LoadedDocument, RetryDecision};
pub use document::reader::{parse_file, read_document, CryptoHeader, ParsedDocument};
pub use document::writer::{backup_path, build_document, save_document, write_document};
pub use document::{DocumentCipher, INTEGRITY_MARKER};
pub use error::VaultError;
pub use export::{export_plaintext, write_plaintext};
pub use failure::{FailureCategory, ReadWriteFailure, Severity};
pub use property::{Property, PropertyType, HIDDEN_MASK};
pub use session::Session;
pub use settings::{PasswordPage, SecurityPage, Settings, SettingsPage};
pub use tree::{Node, NodeId, NodeKind, PasswordTree, PropertyEdit, SubscriptionId, TreeEvent};
