//! Document serialization.
//!
//! The complete document is rendered in memory first. Only then is the
//! previous file copied to its backup and the new content written to a
//! temporary file that is renamed over the destination, so a failed save
//! leaves the old document untouched.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::xml::XmlElement;
use super::{
    DocumentCipher, CATEGORY_ELEMENT, DOCUMENT_ELEMENT, ENTRY_ELEMENT, FORMAT_VERSION,
    PASSWORDS_ELEMENT,
};
use crate::error::VaultError;
use crate::failure::ReadWriteFailure;
use crate::tree::{NodeId, NodeKind, PasswordTree};

/// Suffix appended to the document file name for the previous version.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Where the previous version of `path` is kept.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

/// Render `tree` as a complete document string.
///
/// # Errors
///
/// Propagates encryption and serialization failures.
pub fn build_document(tree: &PasswordTree, cipher: &DocumentCipher) -> Result<String, VaultError> {
    let mut root = XmlElement::new(DOCUMENT_ELEMENT).with_attribute("version", FORMAT_VERSION);
    root.push_child(cipher.header_element()?);
    let passwords = root.push_child(XmlElement::new(PASSWORDS_ELEMENT));
    for id in tree.roots() {
        write_node(tree, *id, passwords, cipher)?;
    }
    root.to_xml_string()
}

/// Save `tree` to `path`.
///
/// With `keep_backup`, an existing file at `path` is first copied to
/// [`backup_path`].
///
/// # Errors
///
/// [`VaultError::Io`] for file system failures, plus everything
/// [`build_document`] returns. On error the file at `path` is unchanged.
pub fn write_document(
    path: &Path,
    tree: &PasswordTree,
    cipher: &DocumentCipher,
    keep_backup: bool,
) -> Result<(), VaultError> {
    let content = build_document(tree, cipher)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| VaultError::InvalidArgument(format!("{} is not a file", path.display())))?;
    let mut tmp_name = OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    if keep_backup && path.exists() {
        fs::copy(path, backup_path(path))?;
    }

    fs::write(&tmp, content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    info!(
        path = %path.display(),
        nodes = tree.node_count(),
        scheme = %cipher.scheme(),
        "document saved"
    );
    Ok(())
}

/// [`write_document`] with the error classified for the caller.
///
/// # Errors
///
/// A [`ReadWriteFailure`]; I/O failures are retryable since the key is
/// still held in memory.
pub fn save_document(
    path: &Path,
    tree: &PasswordTree,
    cipher: &DocumentCipher,
    keep_backup: bool,
) -> Result<(), ReadWriteFailure> {
    write_document(path, tree, cipher, keep_backup).map_err(|e| {
        let failure = ReadWriteFailure::from_save_error(&e, path);
        warn!(path = %path.display(), category = %failure.category, "save failed");
        failure
    })
}

fn write_node(
    tree: &PasswordTree,
    id: NodeId,
    parent: &mut XmlElement,
    cipher: &DocumentCipher,
) -> Result<(), VaultError> {
    let Some(node) = tree.node(id) else {
        return Ok(());
    };

    match node.kind() {
        NodeKind::Category { children } => {
            let mut element =
                XmlElement::new(CATEGORY_ELEMENT).with_attribute("name", node.name());
            element.set_flag("wasOpen", node.is_open());
            element.set_flag("isSelected", node.is_selected());
            for child in children {
                write_node(tree, *child, &mut element, cipher)?;
            }
            parent.push_child(element);
        }
        NodeKind::Entry { properties } => {
            let mut element = XmlElement::new(ENTRY_ELEMENT).with_attribute("name", node.name());
            element.set_flag("isSelected", node.is_selected());
            for property in properties {
                property.append_xml(&mut element, cipher.encryptor())?;
            }
            parent.push_child(element);
        }
    }
    Ok(())
}
