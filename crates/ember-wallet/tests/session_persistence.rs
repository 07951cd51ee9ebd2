//! Session-envelope persistence across store instances.

use ember_wallet::{AuthProvider, LocalStore, SessionEnvelope};

fn envelope(token: Option<&str>) -> SessionEnvelope {
    SessionEnvelope {
        auth_token: token.map(str::to_owned),
        device_share: "1:000000000000000000000000000000ab".into(),
        email: Some("user@example.com".into()),
        phone: None,
        wallet_user_id: "user-7".into(),
        auth_provider: AuthProvider::Email,
    }
}

#[test]
fn envelope_survives_a_store_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store.save(&envelope(Some("bearer-token"))).unwrap();
    }

    let reopened = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
    let loaded = reopened.load().unwrap().unwrap();
    assert_eq!(loaded.auth_token.as_deref(), Some("bearer-token"));
    assert_eq!(loaded.wallet_user_id, "user-7");
    assert_eq!(loaded.auth_provider, AuthProvider::Email);
}

#[test]
fn saves_replace_the_whole_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();

    store.save(&envelope(Some("first"))).unwrap();
    store.save(&envelope(None)).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert!(loaded.auth_token.is_none(), "old token must not resurface");
}

#[test]
fn clear_then_load_reports_enrollment_needed() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
    store.save(&envelope(Some("tok"))).unwrap();
    store.clear().unwrap();
    assert!(store.load().unwrap().is_none());
}
