use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    api::error,
    constants::Env,
    platform::{
        auth::{AccountDirectory, InMemoryAuth},
        clock::Clock,
        document_memory::InMemoryDocumentStore,
        messaging::{InMemoryPush, Permission, PushMessaging},
        storage::InMemoryBlobStore,
        Platform,
    },
};

/// Shared state of a locally simulated backend. Every client session
/// connected to the same `LocalBackend` sees the same accounts, documents
/// and blobs.
#[derive(Clone)]
pub struct LocalBackend {
    pub directory: AccountDirectory,
    pub db: Arc<InMemoryDocumentStore>,
    pub storage: Arc<InMemoryBlobStore>,
    pub clock: Arc<dyn Clock>,
    env: Arc<Env>,
}

pub fn connect_platform(env: Env, clock: Arc<dyn Clock>) -> LocalBackend {
    let storage = InMemoryBlobStore::new(&env.storage_base_url, &env.storage_bucket, clock.clone());
    tracing::info!(project = %env.project_id, bucket = %env.storage_bucket, "local backend ready");
    LocalBackend {
        directory: AccountDirectory::default(),
        db: Arc::new(InMemoryDocumentStore::new(clock.clone())),
        storage: Arc::new(storage),
        clock,
        env: Arc::new(env),
    }
}

impl LocalBackend {
    pub fn env(&self) -> &Env {
        &self.env
    }

    /// A fresh client session: its own auth state and push registration.
    pub fn session(&self) -> Platform {
        self.session_with_push(Arc::new(InMemoryPush::new(Permission::Granted)))
    }

    pub fn session_with_push(&self, messaging: Arc<dyn PushMessaging>) -> Platform {
        let auth = InMemoryAuth::new(
            self.directory.clone(),
            &self.env.auth_secret,
            self.env.session_expiration,
        );
        Platform {
            auth: Arc::new(auth),
            db: self.db.clone(),
            storage: self.storage.clone(),
            messaging,
            clock: self.clock.clone(),
            env: self.env.clone(),
        }
    }
}

/// Small persisted key/value store for client-side flags, kept as one JSON
/// object on disk.
#[derive(Debug, Clone)]
pub struct LocalPrefs {
    path: PathBuf,
}

impl LocalPrefs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Map<String, Value>, error::SystemError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn store(&self, prefs: &Map<String, Value>) -> Result<(), error::SystemError> {
        let serialized = serde_json::to_vec_pretty(prefs)?;
        tokio::fs::write(&self.path, serialized).await?;
        Ok(())
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, error::SystemError>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.load().await?.remove(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), error::SystemError>
    where
        T: serde::Serialize,
    {
        let mut prefs = self.load().await?;
        prefs.insert(key.to_string(), serde_json::to_value(value)?);
        self.store(&prefs).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), error::SystemError> {
        let mut prefs = self.load().await?;
        if prefs.remove(key).is_some() {
            self.store(&prefs).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = LocalPrefs::new(&path);
        assert_eq!(prefs.get::<bool>("hasSeenWelcome_VibeMP").await.unwrap(), None);
        prefs.set("hasSeenWelcome_VibeMP", &true).await.unwrap();

        let reopened = LocalPrefs::new(&path);
        assert_eq!(reopened.get::<bool>("hasSeenWelcome_VibeMP").await.unwrap(), Some(true));

        reopened.delete("hasSeenWelcome_VibeMP").await.unwrap();
        assert_eq!(prefs.get::<bool>("hasSeenWelcome_VibeMP").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_prefs_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(LocalPrefs::new(&path).get::<bool>("x").await.is_err());
    }
}
