//! Durable per-tenant credential storage.

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use {async_trait::async_trait, tracing::debug};

use crate::client::Credentials;

/// Loads credentials on session start, persists rotations, and invalidates
/// on terminal auth failure.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, tenant: &str) -> anyhow::Result<Option<Credentials>>;
    async fn save(&self, tenant: &str, credentials: &Credentials) -> anyhow::Result<()>;
    async fn invalidate(&self, tenant: &str) -> anyhow::Result<()>;
}

/// In-memory store. No persistence — for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, tenant: &str) -> anyhow::Result<Option<Credentials>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(tenant).cloned())
    }

    async fn save(&self, tenant: &str, credentials: &Credentials) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(tenant.to_string(), credentials.clone());
        Ok(())
    }

    async fn invalidate(&self, tenant: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(tenant);
        Ok(())
    }
}

/// One JSON file per tenant under a base directory.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, tenant: &str) -> PathBuf {
        // Tenant keys come from callers; never let them escape the dir.
        let safe: String = tenant
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, tenant: &str) -> anyhow::Result<Option<Credentials>> {
        let path = self.path_for(tenant);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let credentials: Credentials = serde_json::from_slice(&bytes)?;
                Ok(Some(credentials))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, tenant: &str, credentials: &Credentials) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(tenant);
        let json = serde_json::to_vec_pretty(credentials)?;
        tokio::fs::write(&path, json).await?;
        debug!(tenant, path = %path.display(), "credentials saved");
        Ok(())
    }

    async fn invalidate(&self, tenant: &str) -> anyhow::Result<()> {
        let path = self.path_for(tenant);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert!(store.load("t1").await.unwrap().is_none());

        let creds = Credentials::new(json!({"device": "abc"}));
        store.save("t1", &creds).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap(), Some(creds));

        store.invalidate("t1").await.unwrap();
        assert!(store.load("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        assert!(store.load("tenant-a").await.unwrap().is_none());

        let creds = Credentials::new(json!({"keys": [1, 2, 3]}));
        store.save("tenant-a", &creds).await.unwrap();
        assert_eq!(store.load("tenant-a").await.unwrap(), Some(creds));

        store.invalidate("tenant-a").await.unwrap();
        assert!(store.load("tenant-a").await.unwrap().is_none());
        // Double invalidate is fine.
        store.invalidate("tenant-a").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_sanitizes_tenant_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());

        let creds = Credentials::new(json!({}));
        store.save("../evil/../../tenant", &creds).await.unwrap();

        // Everything stays inside the base dir.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        assert!(entry.path().starts_with(dir.path()));
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
