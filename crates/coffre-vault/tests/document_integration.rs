#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the document pipeline: write, load state machine,
//! wrong-password and corruption handling, backup recovery.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use coffre_crypto_core::{Argon2idParams, StrengthEstimator};
use coffre_vault::document::xml::XmlElement;
use coffre_vault::{
    backup_path, build_document, write_document, DocumentCipher, FailureCategory, LoadMachine,
    LoadOutcome, ParsedDocument, PasswordTree, Property, PropertyType, ReadWriteFailure,
    RetryDecision, Settings, Severity,
};
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const TEST_PARAMS: Argon2idParams = Argon2idParams {
    m_cost: 32,
    t_cost: 1,
    p_cost: 1,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn settings() -> Settings {
    Settings {
        kdf: TEST_PARAMS,
        ..Settings::default()
    }
}

fn sealed(password: &str) -> DocumentCipher {
    DocumentCipher::derive(password, b"integration-salt", &TEST_PARAMS).unwrap()
}

/// Two categories, three entries each, two properties per entry.
fn shaped_tree() -> PasswordTree {
    let est = StrengthEstimator::default();
    let mut tree = PasswordTree::new(StrengthEstimator::default());
    for c in 0..2 {
        let cat = tree.add_category(None, &format!("category-{c}")).unwrap();
        for e in 0..3 {
            let entry = tree.add_entry(Some(cat), &format!("entry-{c}-{e}")).unwrap();
            tree.append_property(
                entry,
                Property::new(
                    "User",
                    &format!("user-{c}-{e}"),
                    PropertyType::Username,
                    false,
                    false,
                    &est,
                ),
            );
            tree.append_property(
                entry,
                Property::new(
                    "Password",
                    &format!("Pw!{c}{e}-secret"),
                    PropertyType::Password,
                    true,
                    true,
                    &est,
                ),
            );
        }
    }
    tree
}

fn answer(password: &'static str) -> impl FnMut(u32) -> Option<Zeroizing<String>> {
    move |_| Some(Zeroizing::new(password.to_string()))
}

fn load_once(path: &Path, password: &'static str) -> (LoadOutcome, Vec<ReadWriteFailure>) {
    let failures = RefCell::new(Vec::new());
    let s = settings();
    let outcome = LoadMachine::new(path, &s).run(answer(password), |f| {
        failures.borrow_mut().push(f.clone());
        RetryDecision::Abort
    });
    (outcome, failures.into_inner())
}

// ---------------------------------------------------------------------------
// Wrong password / corruption
// ---------------------------------------------------------------------------

#[test]
fn wrong_password_is_retryable_warning() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    write_document(&path, &shaped_tree(), &sealed("correct"), false).unwrap();

    let (outcome, failures) = load_once(&path, "wrong");
    assert!(matches!(outcome, LoadOutcome::Aborted));
    assert_eq!(failures.len(), 1);
    let f = &failures[0];
    assert_eq!(f.category, FailureCategory::WrongPassword);
    assert_eq!(f.severity, Severity::Warning);
    assert!(f.retry_is_meaningful);
}

#[test]
fn wrong_then_right_password_loads() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    write_document(&path, &shaped_tree(), &sealed("correct"), false).unwrap();

    let s = settings();
    let mut answers = vec!["correct", "wrong"];
    let outcome = LoadMachine::new(&path, &s).run(
        |_| answers.pop().map(|p| Zeroizing::new(p.to_string())),
        |_| RetryDecision::Retry,
    );
    match outcome {
        LoadOutcome::Loaded(doc) => assert_eq!(doc.tree.node_count(), 8),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn truncated_body_is_corrupt_with_correct_password() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    write_document(&path, &shaped_tree(), &sealed("correct"), false).unwrap();
    let full = fs::read(&path).unwrap();
    let text = String::from_utf8(full.clone()).unwrap();
    let body_start = text.find("<passwords>").unwrap() + "<passwords>".len();
    let body_end = text.find("</passwords>").unwrap();

    for cut in [body_start, (body_start + body_end) / 2, body_end - 1] {
        fs::write(&path, &full[..cut]).unwrap();
        let (outcome, _) = load_once(&path, "correct");
        match outcome {
            LoadOutcome::Failed(f) => {
                assert_eq!(f.category, FailureCategory::Corrupt, "cut at {cut}");
                assert_eq!(f.severity, Severity::Critical);
                assert!(!f.retry_is_meaningful);
            }
            other => panic!("unexpected outcome {other:?} for cut at {cut}"),
        }
    }
}

#[test]
fn tampered_value_is_corrupt_not_wrong_password() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    let cipher = sealed("correct");
    let xml = build_document(&shaped_tree(), &cipher).unwrap();

    // Still valid base64 with valid framing, but the tag no longer verifies.
    let mut root = XmlElement::parse(&xml).unwrap();
    let passwords = root.children.iter_mut().find(|c| c.name == "passwords").unwrap();
    let property = &mut passwords.children[0].children[0].children[1];
    assert_eq!(property.attribute("encrypted"), Some("1"));
    let mut raw = property.text.clone().into_bytes();
    let mid = raw.len() / 2;
    raw[mid] = if raw[mid] == b'A' { b'B' } else { b'A' };
    property.text = String::from_utf8(raw).unwrap();
    fs::write(&path, root.to_xml_string().unwrap()).unwrap();

    let (outcome, _) = load_once(&path, "correct");
    match outcome {
        LoadOutcome::Failed(f) => assert_eq!(f.category, FailureCategory::Corrupt),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn oversized_kdf_header_is_corrupt_without_deriving() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    let xml = build_document(&shaped_tree(), &sealed("correct")).unwrap();

    let mut root = XmlElement::parse(&xml).unwrap();
    let crypto = root.children.iter_mut().find(|c| c.name == "crypto").unwrap();
    crypto.set_attribute("mCost", "4000000000");
    fs::write(&path, root.to_xml_string().unwrap()).unwrap();

    let (outcome, failures) = load_once(&path, "correct");
    assert!(failures.is_empty());
    match outcome {
        LoadOutcome::Failed(f) => {
            assert_eq!(f.category, FailureCategory::Corrupt);
            assert_eq!(f.severity, Severity::Critical);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn missing_file_is_critical_io() {
    let dir = tempfile::TempDir::new().unwrap();
    let (outcome, failures) = load_once(&dir.path().join("none.xml"), "correct");
    assert!(failures.is_empty());
    match outcome {
        LoadOutcome::Failed(f) => {
            assert_eq!(f.category, FailureCategory::Io);
            assert_eq!(f.severity, Severity::Critical);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Backup and abort
// ---------------------------------------------------------------------------

#[test]
fn corrupt_document_recovers_from_backup() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    let cipher = sealed("correct");

    write_document(&path, &shaped_tree(), &cipher, true).unwrap();
    let mut newer = shaped_tree();
    newer.add_category(None, "added-later").unwrap();
    write_document(&path, &newer, &cipher, true).unwrap();
    assert!(backup_path(&path).exists());

    let full = fs::read(&path).unwrap();
    fs::write(&path, &full[..full.len() / 2]).unwrap();

    let failures = RefCell::new(Vec::new());
    let s = settings();
    let mut prompts = 0;
    let outcome = LoadMachine::new(&path, &s).run(
        |_| {
            prompts += 1;
            Some(Zeroizing::new("correct".to_string()))
        },
        |f| {
            failures.borrow_mut().push(f.clone());
            RetryDecision::Retry
        },
    );

    let failures = failures.into_inner();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].category, FailureCategory::Corrupt);
    assert_eq!(failures[0].severity, Severity::Warning);
    assert!(failures[0].retry_is_meaningful);

    match outcome {
        LoadOutcome::Loaded(doc) => {
            assert!(doc.from_backup);
            assert_eq!(doc.path, path);
            assert_eq!(doc.tree.roots().len(), 2);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(prompts, 1);
}

#[test]
fn cancelled_prompt_aborts_without_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    write_document(&path, &shaped_tree(), &sealed("correct"), false).unwrap();

    let s = settings();
    let outcome = LoadMachine::new(&path, &s).run(
        |_| None,
        |_| panic!("no failure expected"),
    );
    assert!(matches!(outcome, LoadOutcome::Aborted));
}

#[test]
fn plain_document_is_loaded_without_prompt() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    write_document(&path, &shaped_tree(), &DocumentCipher::plain(), false).unwrap();

    let s = settings();
    let outcome = LoadMachine::new(&path, &s).run(
        |_| panic!("no prompt expected"),
        |_| panic!("no failure expected"),
    );
    assert!(matches!(outcome, LoadOutcome::Loaded(_)));
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[test]
fn tree_shape_and_order_survive_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    write_document(&path, &shaped_tree(), &sealed("correct"), false).unwrap();

    let (outcome, _) = load_once(&path, "correct");
    let LoadOutcome::Loaded(doc) = outcome else {
        panic!("document did not load");
    };
    let tree = doc.tree;

    assert_eq!(tree.roots().len(), 2);
    for (c, cat) in tree.roots().iter().enumerate() {
        let node = tree.node(*cat).unwrap();
        assert!(node.is_category());
        assert!(node.properties().is_empty());
        assert_eq!(node.name(), format!("category-{c}"));

        let entries = tree.children(Some(*cat));
        assert_eq!(entries.len(), 3);
        for (e, entry) in entries.iter().enumerate() {
            let node = tree.node(*entry).unwrap();
            assert!(!node.is_category());
            assert!(node.children().is_empty());
            assert_eq!(node.name(), format!("entry-{c}-{e}"));

            let props = node.properties();
            assert_eq!(props.len(), 2);
            assert_eq!(props[0].key(), "User");
            assert_eq!(props[0].value(), format!("user-{c}-{e}"));
            assert_eq!(props[1].kind(), PropertyType::Password);
            assert_eq!(props[1].value(), format!("Pw!{c}{e}-secret"));
            assert!(props[1].is_encrypted());
            assert!(props[1].is_hidden());
        }
    }
}

#[test]
fn encrypted_values_never_appear_in_file() {
    let xml = build_document(&shaped_tree(), &sealed("correct")).unwrap();
    assert!(!xml.contains("-secret"));
    assert!(xml.contains("user-0-0"));
}

#[test]
fn advisory_flags_default_to_false() {
    let xml = build_document(&shaped_tree(), &DocumentCipher::plain())
        .unwrap()
        .replace(r#" wasOpen="0""#, "")
        .replace(r#" isSelected="0""#, "");
    let parsed = ParsedDocument::parse(&xml).unwrap();
    let tree = parsed
        .build_tree(&parsed.unlock("").unwrap(), StrengthEstimator::default())
        .unwrap();
    for id in tree.iter() {
        let node = tree.node(id).unwrap();
        assert!(!node.is_open());
        assert!(!node.is_selected());
    }
}
