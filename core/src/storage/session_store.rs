use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::StoragePaths;
use crate::api::types::UserProfile;
use crate::errors::{WalletError, WalletResult};

const SESSION_MAGIC: &[u8; 8] = b"RPPAYSES";
const SESSION_VERSION: u16 = 1;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Credentials and profile persisted between launches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub token: String,
    pub user: UserProfile,
    pub saved_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, user: UserProfile) -> Self {
        Self {
            token,
            user,
            saved_at: Utc::now(),
        }
    }
}

impl Drop for SessionData {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    magic: [u8; 8],
    version: u16,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

/// Encrypted at-rest store for the bearer token and user profile.
///
/// Sealed with a device key generated on first use; the key never leaves
/// the wallet's data directory. Only the session component reads or
/// writes this file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    key_path: PathBuf,
}

impl SessionStore {
    pub fn from_paths(paths: &StoragePaths) -> Self {
        Self {
            path: paths.session_file().to_path_buf(),
            key_path: paths.device_key_file().to_path_buf(),
        }
    }

    pub fn new(path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key_path: key_path.as_ref().to_path_buf(),
        }
    }

    /// Load the persisted session, or `None` when none has been saved.
    pub fn load(&self) -> WalletResult<Option<SessionData>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        let envelope: SessionEnvelope = serde_json::from_slice(&bytes)?;
        if &envelope.magic != SESSION_MAGIC {
            return Err(WalletError::StorageError(
                "Unrecognized session file format".to_string(),
            ));
        }
        if envelope.version != SESSION_VERSION {
            return Err(WalletError::StorageError(format!(
                "Unsupported session version {}",
                envelope.version
            )));
        }

        let key = self.load_or_create_key()?;
        let opened = open_sealed(&key, envelope.nonce, envelope.ciphertext)?;
        let data: SessionData = serde_json::from_slice(&opened)?;
        Ok(Some(data))
    }

    /// Seal and persist the session, replacing any previous one.
    pub fn save(&self, data: &SessionData) -> WalletResult<()> {
        let key = self.load_or_create_key()?;
        let plaintext = Zeroizing::new(serde_json::to_vec(data)?);

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = seal(&key, nonce, &plaintext)?;

        let envelope = SessionEnvelope {
            magic: *SESSION_MAGIC,
            version: SESSION_VERSION,
            nonce,
            ciphertext,
        };
        let serialized = serde_json::to_vec(&envelope)?;

        let tmp_path = self.path.with_extension("new");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&serialized)?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }

    /// Remove the persisted session. No-op when nothing is stored.
    pub fn clear(&self) -> WalletResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn load_or_create_key(&self) -> WalletResult<Zeroizing<[u8; KEY_LEN]>> {
        if self.key_path.exists() {
            let encoded = fs::read_to_string(&self.key_path)?;
            let decoded = hex::decode(encoded.trim())
                .map_err(|e| WalletError::StorageError(format!("Malformed device key: {}", e)))?;
            if decoded.len() != KEY_LEN {
                return Err(WalletError::StorageError(
                    "Device key has unexpected length".to_string(),
                ));
            }
            let mut key = Zeroizing::new([0u8; KEY_LEN]);
            key.copy_from_slice(&decoded);
            return Ok(key);
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut *key);

        if let Some(parent) = self.key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.key_path, hex::encode(&*key))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.key_path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(key)
    }
}

fn seal(key: &[u8; KEY_LEN], nonce: [u8; NONCE_LEN], plaintext: &[u8]) -> WalletResult<Vec<u8>> {
    let unbound = UnboundKey::new(&aead::CHACHA20_POLY1305, key)
        .map_err(|_| WalletError::StorageError("Failed to derive sealing key".to_string()))?;
    let sealing = LessSafeKey::new(unbound);

    let mut buffer = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut buffer)
        .map_err(|_| WalletError::StorageError("Failed to seal session data".to_string()))?;
    Ok(buffer)
}

fn open_sealed(
    key: &[u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
    mut ciphertext: Vec<u8>,
) -> WalletResult<Vec<u8>> {
    let unbound = UnboundKey::new(&aead::CHACHA20_POLY1305, key)
        .map_err(|_| WalletError::StorageError("Failed to derive sealing key".to_string()))?;
    let opening = LessSafeKey::new(unbound);

    let opened = opening
        .open_in_place(
            Nonce::assume_unique_for_key(nonce),
            Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| {
            WalletError::StorageError("Session data failed integrity verification".to_string())
        })?;
    Ok(opened.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> SessionStore {
        SessionStore::new(
            temp.path().join("session.vault"),
            temp.path().join("device.key"),
        )
    }

    fn data() -> SessionData {
        SessionData::new(
            "bearer-token".to_string(),
            UserProfile {
                id: Some("user-1".to_string()),
                email: "user@example.com".to_string(),
                name: None,
                wallet_address: Some("rExampleAddress".to_string()),
            },
        )
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let saved = data();
        store.save(&saved).unwrap();
        let loaded = store.load().unwrap().expect("session should be present");
        assert_eq!(loaded, saved);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let temp = TempDir::new().unwrap();
        assert_eq!(store(&temp).load().unwrap(), None);
    }

    #[test]
    fn tampered_file_detected() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&data()).unwrap();

        let mut bytes = fs::read(temp.path().join("session.vault")).unwrap();
        let index = bytes.len() / 2;
        bytes[index] ^= 0xAA;
        fs::write(temp.path().join("session.vault"), bytes).unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn clear_removes_file_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&data()).unwrap();

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn device_key_is_created_once_and_reused() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.save(&data()).unwrap();
        let key_before = fs::read_to_string(temp.path().join("device.key")).unwrap();

        // A second store instance over the same directory opens the same file.
        let reopened = SessionStore::new(
            temp.path().join("session.vault"),
            temp.path().join("device.key"),
        );
        let loaded = reopened.load().unwrap().expect("session should be present");
        assert_eq!(loaded.token, "bearer-token");

        let key_after = fs::read_to_string(temp.path().join("device.key")).unwrap();
        assert_eq!(key_before, key_after);
    }
}
