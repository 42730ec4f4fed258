//! Fuzz target for the document reader.
//!
//! Feeds arbitrary strings through `ParsedDocument::parse`, a plain unlock
//! and tree construction. Must never panic.
//!
//! # Usage
//!
//! ```sh
//! cd crates/coffre-vault
//! cargo +nightly fuzz run document_parse -- -max_len=16384
//! ```

#![no_main]

use coffre_crypto_core::StrengthEstimator;
use coffre_vault::ParsedDocument;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(parsed) = ParsedDocument::parse(data) else {
        return;
    };
    if parsed.needs_password() {
        return;
    }
    if let Ok(cipher) = parsed.unlock("") {
        let _ = parsed.build_tree(&cipher, StrengthEstimator::default());
    }
});
