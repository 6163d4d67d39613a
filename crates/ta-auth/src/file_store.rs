use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::fs;
use tracing::debug;

use crate::credential::Credential;
use crate::errors::{AuthError, Result};
use crate::store::CredentialStore;

/// Credential store backed by a single JSON file
///
/// # Directory Structure
/// ```text
/// ~/.config/tonearm/
/// ├── credential.json    # Serialized credential
/// └── credential.lock    # Advisory lock file
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
    lock_file: PathBuf,
}

impl JsonFileCredentialStore {
    /// Create a store writing to `path`, creating its directory if needed
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        fs::create_dir_all(&dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }

        let lock_file = path.with_extension("lock");
        Ok(Self { path, lock_file })
    }

    /// Default credential file for the current platform
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "tonearm")
            .ok_or_else(|| AuthError::storage("Could not determine config directory"))?;

        Ok(project_dirs.config_dir().join("credential.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire an exclusive lock on the storage
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| AuthError::storage("Credential file is locked by another process"))?;

        Ok(lock_file)
    }
}

#[async_trait::async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await?;
        let credential = serde_json::from_str(&content)
            .map_err(|e| AuthError::storage(format!("Invalid credential file: {}", e)))?;

        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthError::storage(format!("Failed to serialize credential: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).await?;

        let file = std::fs::File::open(&temp_path)?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), "Saved credential");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _lock = self.acquire_lock()?;

        if fs::try_exists(&self.path).await? {
            fs::remove_file(&self.path).await?;
        }

        Ok(())
    }
}
