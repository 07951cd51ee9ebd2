//! Session-envelope persistence.
//!
//! One JSON file, written atomically: serialize to `session.json.tmp`,
//! then rename over `session.json`. A crash mid-save leaves either the old
//! envelope or the new one on disk, never a torn record.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, WalletError};
use crate::types::SessionEnvelope;

const SESSION_FILE: &str = "session.json";

/// Persistent store for the session envelope.
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Open the default store under `~/.emberwallet`.
    pub fn new() -> Result<Self> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".into());
        Self::with_dir(PathBuf::from(home).join(".emberwallet"))
    }

    /// Open a store rooted at an explicit directory.
    pub fn with_dir(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)
            .map_err(|e| WalletError::Storage(format!("cannot create data directory: {e}")))?;
        Ok(Self { base_dir })
    }

    fn session_path(&self) -> PathBuf {
        self.base_dir.join(SESSION_FILE)
    }

    /// Load the envelope, or `None` when the device has never enrolled.
    pub fn load(&self) -> Result<Option<SessionEnvelope>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Persist the envelope atomically.
    pub fn save(&self, envelope: &SessionEnvelope) -> Result<()> {
        write_json(&self.session_path(), envelope)
    }

    /// Drop the auth token but keep the rest of the envelope.
    ///
    /// The surviving device share is useless without a token, so this is
    /// the sign-out persistence step.
    pub fn remove_auth_token(&self) -> Result<()> {
        if let Some(mut envelope) = self.load()? {
            envelope.auth_token = None;
            self.save(&envelope)?;
        }
        Ok(())
    }

    /// Delete the envelope entirely.
    pub fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| WalletError::Storage(format!("failed to delete session: {e}")))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| WalletError::Storage(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| WalletError::StorageCorrupt(format!("{}: {e}", path.display())))
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| WalletError::Storage(format!("failed to serialize: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &content)
        .map_err(|e| WalletError::Storage(format!("failed to write: {e}")))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| WalletError::Storage(format!("failed to commit write: {e}")))?;

    set_restrictive_permissions(path)
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| WalletError::Storage(format!("failed to set file permissions: {e}")))
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthProvider;

    fn envelope() -> SessionEnvelope {
        SessionEnvelope {
            auth_token: Some("token".into()),
            device_share: "1:00aa".into(),
            email: Some("user@example.com".into()),
            phone: None,
            wallet_user_id: "u-42".into(),
            auth_provider: AuthProvider::Email,
        }
    }

    #[test]
    fn empty_store_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store.save(&envelope()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.device_share, "1:00aa");
        assert_eq!(loaded.auth_token.as_deref(), Some("token"));
    }

    #[test]
    fn remove_auth_token_keeps_device_share() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store.save(&envelope()).unwrap();
        store.remove_auth_token().unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.auth_token.is_none());
        assert_eq!(loaded.device_share, "1:00aa");
    }

    #[test]
    fn clear_removes_the_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store.save(&envelope()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn no_tmp_file_survives_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        store.save(&envelope()).unwrap();
        assert!(!dir.path().join("session.tmp").exists());
        assert!(!dir.path().join("session.json.tmp").exists());
    }

    #[test]
    fn corrupt_envelope_is_reported_not_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::with_dir(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();
        assert!(matches!(
            store.load(),
            Err(WalletError::StorageCorrupt(_))
        ));
    }
}
