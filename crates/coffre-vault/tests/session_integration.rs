#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the session: create, edit, save, reopen, re-key.

use coffre_crypto_core::Argon2idParams;
use coffre_vault::{
    export_plaintext, FailureCategory, PropertyEdit, PropertyType, RetryDecision, Session,
    Settings,
};
use zeroize::Zeroizing;

fn settings() -> Settings {
    Settings {
        kdf: Argon2idParams {
            m_cost: 32,
            t_cost: 1,
            p_cost: 1,
        },
        ..Settings::default()
    }
}

fn reopen(
    session: &mut Session,
    path: &std::path::Path,
    s: &Settings,
    password: &str,
) -> Result<bool, coffre_vault::ReadWriteFailure> {
    let password = password.to_string();
    session.open(
        path,
        s,
        move |_| Some(Zeroizing::new(password.clone())),
        |_| RetryDecision::Abort,
    )
}

#[test]
fn create_edit_save_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    let s = settings();

    let mut session = Session::new();
    session.create(&path, "Abc123!", &s).unwrap();
    {
        let tree = session.tree_mut().unwrap();
        let web = tree.add_category(None, "Web").unwrap();
        let entry = tree.add_entry(Some(web), "example.org").unwrap();
        let user = tree.append_default_property(entry, PropertyType::Username).unwrap();
        assert!(tree.edit_property(entry, user, PropertyEdit::Value("alice".into())));
        let pw = tree.append_default_property(entry, PropertyType::Password).unwrap();
        assert!(tree.edit_property(entry, pw, PropertyEdit::Value("Xk9#mQ2$vL7@pR4!".into())));
    }
    session.save(&s).unwrap();
    assert!(!session.is_modified());
    session.logout();
    assert!(!session.is_open());

    assert!(reopen(&mut session, &path, &s, "Abc123!").unwrap());
    assert!(!session.is_modified());
    assert_eq!(
        export_plaintext(session.tree().unwrap()).as_str(),
        "Web: example.org\nUsername: alice\nPassword: Xk9#mQ2$vL7@pR4!\n\n"
    );
}

#[test]
fn changed_master_password_takes_effect_after_save() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    let s = settings();

    let mut session = Session::new();
    session.create(&path, "Abc123!", &s).unwrap();
    session.save(&s).unwrap();
    session.change_master_password(&s, "Abc123!", "Xyz789?").unwrap();
    assert!(session.is_modified());
    session.save(&s).unwrap();
    session.logout();

    let mut seen = Vec::new();
    let opened = session
        .open(
            &path,
            &s,
            |_| Some(Zeroizing::new("Abc123!".to_string())),
            |f| {
                seen.push(f.category);
                RetryDecision::Abort
            },
        )
        .unwrap();
    assert!(!opened);
    assert_eq!(seen, vec![FailureCategory::WrongPassword]);
    assert!(!session.is_open());
    assert!(reopen(&mut session, &path, &s, "Xyz789?").unwrap());
}

#[test]
fn save_as_moves_the_document() {
    let dir = tempfile::TempDir::new().unwrap();
    let first = dir.path().join("a.xml");
    let second = dir.path().join("b.xml");
    let s = settings();

    let mut session = Session::new();
    session.create(&first, "Abc123!", &s).unwrap();
    session.save_as(&second, &s).unwrap();
    assert_eq!(session.path(), Some(second.as_path()));
    assert!(second.exists());
    assert!(!first.exists());
}

#[test]
fn cancelled_open_leaves_session_untouched() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("passwords.xml");
    let s = settings();

    let mut session = Session::new();
    session.create(&path, "Abc123!", &s).unwrap();
    session.save(&s).unwrap();

    let mut other = Session::new();
    let opened = other
        .open(&path, &s, |_| None, |_| RetryDecision::Abort)
        .unwrap();
    assert!(!opened);
    assert!(!other.is_open());
}

#[test]
fn stricter_thresholds_reclassify_existing_passwords() {
    let s = settings();
    let mut session = Session::new();
    session
        .create(std::path::Path::new("/tmp/unsaved.xml"), "Abc123!", &s)
        .unwrap();
    let (entry, index) = {
        let tree = session.tree_mut().unwrap();
        let entry = tree.add_entry(None, "site").unwrap();
        let index = tree.append_default_property(entry, PropertyType::Password).unwrap();
        tree.edit_property(entry, index, PropertyEdit::Value("Tr0ub4dor&3xY".into()));
        (entry, index)
    };
    assert!(!session.tree().unwrap().has_weak_children(entry));

    let strict = Settings {
        weak_below_days: f64::MAX,
        strong_from_days: f64::MAX,
        ..s
    };
    session.apply_settings(&strict).unwrap();
    let tree = session.tree().unwrap();
    assert!(tree.has_weak_children(entry));
    assert_eq!(
        tree.property(entry, index).unwrap().strength(),
        coffre_crypto_core::PasswordStrength::Weak
    );
}
