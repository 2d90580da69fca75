use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{WalletError, WalletResult};

/// Manages filesystem paths used by the wallet core.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// Root directory for wallet data.
    root_dir: PathBuf,
    /// Sealed session file path.
    session_file: PathBuf,
    /// Device key used to seal the session file.
    device_key_file: PathBuf,
    /// Path to persisted wallet configuration.
    config_file: PathBuf,
}

impl StoragePaths {
    /// Default session file name used on disk.
    pub const SESSION_FILENAME: &'static str = "session.vault";
    /// Device key file name.
    pub const DEVICE_KEY_FILENAME: &'static str = "device.key";
    /// Configuration file name.
    pub const CONFIG_FILENAME: &'static str = "wallet.config";

    /// Create a new path manager rooted at the provided directory.
    pub fn new(root: impl AsRef<Path>) -> WalletResult<Self> {
        let root_dir = root.as_ref().to_path_buf();
        if root_dir.as_os_str().is_empty() {
            return Err(WalletError::StorageError(
                "Wallet root directory cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            session_file: root_dir.join(Self::SESSION_FILENAME),
            device_key_file: root_dir.join(Self::DEVICE_KEY_FILENAME),
            config_file: root_dir.join(Self::CONFIG_FILENAME),
            root_dir,
        })
    }

    /// Ensure the directory structure exists, creating missing folders.
    pub fn ensure_directories(&self) -> WalletResult<()> {
        fs::create_dir_all(&self.root_dir)?;
        Ok(())
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn session_file(&self) -> &Path {
        &self.session_file
    }

    pub fn device_key_file(&self) -> &Path {
        &self.device_key_file
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }
}
