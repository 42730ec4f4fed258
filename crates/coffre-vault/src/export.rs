//! Cleartext export of the whole tree.
//!
//! Every value is written unencrypted, hidden ones included. The output is
//! meant for printing or migrating to another tool.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;
use zeroize::Zeroizing;

use crate::error::VaultError;
use crate::tree::{NodeKind, PasswordTree};

/// Render every entry as a `Category: Sub: Entry` header followed by one
/// `key: value` line per property and a blank line.
#[must_use]
pub fn export_plaintext(tree: &PasswordTree) -> Zeroizing<String> {
    let mut out = Zeroizing::new(String::new());
    for id in tree.iter() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        let NodeKind::Entry { properties } = node.kind() else {
            continue;
        };
        let _ = writeln!(out, "{}", tree.path_of(id).join(": "));
        for property in properties {
            let _ = writeln!(out, "{}: {}", property.key(), property.value());
        }
        out.push('\n');
    }
    out
}

/// Write [`export_plaintext`] to `path`, owner-readable only on Unix.
///
/// # Errors
///
/// [`VaultError::Io`] if the file cannot be written.
pub fn write_plaintext(tree: &PasswordTree, path: &Path) -> Result<(), VaultError> {
    let text = export_plaintext(tree);
    fs::write(path, text.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    info!(path = %path.display(), "cleartext export written");
    Ok(())
}
