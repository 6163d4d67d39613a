use std::sync::{Arc, RwLock};

use crate::credential::Credential;
use crate::errors::{AuthError, Result};

/// Persistence contract for a single credential
///
/// Implementations need no locking of their own against concurrent refreshes:
/// writes only ever come from one single-flighted refresh at a time.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, if any
    async fn load(&self) -> Result<Option<Credential>>;

    /// Replace the stored credential
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential
    async fn clear(&self) -> Result<()>;
}

/// In-memory credential store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    credential: Arc<RwLock<Option<Credential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Arc::new(RwLock::new(Some(credential))),
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        self.credential
            .read()
            .map(|c| c.clone())
            .map_err(|_| AuthError::storage("Lock poisoned"))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self
            .credential
            .write()
            .map_err(|_| AuthError::storage("Lock poisoned"))? = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self
            .credential
            .write()
            .map_err(|_| AuthError::storage("Lock poisoned"))? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().await.unwrap().is_none());

        let credential = Credential::expiring_in("access", Some("refresh".to_string()), 3600, None, "Bearer");
        store.save(&credential).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(credential));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryCredentialStore::new();
        let other = store.clone();
        let credential = Credential::expiring_in("access", None, 60, None, "Bearer");

        tokio_test::block_on(store.save(&credential)).unwrap();
        assert!(tokio_test::block_on(other.load()).unwrap().is_some());
    }
}
