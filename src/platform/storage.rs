//! Blob store collaborator: upload by key, then resolve a download URL.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{api::error, platform::clock::Clock};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobMetadata {
    pub key: String,
    pub content_type: String,
    pub size: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobMetadata, error::SystemError>;

    async fn download_url(&self, key: &str) -> Result<String, error::SystemError>;

    async fn delete(&self, key: &str) -> Result<(), error::SystemError>;
}

/// Keys are embedded in URLs as a single path segment.
fn encode_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            other => {
                let mut buf = [0u8; 4];
                other.encode_utf8(&mut buf).bytes().map(|b| format!("%{b:02X}")).collect()
            }
        })
        .collect()
}

pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, (BlobMetadata, Vec<u8>)>>,
    base_url: String,
    bucket: String,
    unavailable: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl InMemoryBlobStore {
    pub fn new(base_url: &str, bucket: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            unavailable: AtomicBool::new(false),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (BlobMetadata, Vec<u8>)>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn metadata(&self, key: &str) -> Option<BlobMetadata> {
        self.lock().get(key).map(|(meta, _)| meta.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobMetadata, error::SystemError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(error::SystemError::unavailable("storage/retry-limit-exceeded"));
        }
        if key.is_empty() || key.ends_with('/') {
            return Err(error::SystemError::bad_request("storage/invalid-key"));
        }

        let meta = BlobMetadata {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
            uploaded_at: self.clock.now(),
        };
        self.lock().insert(key.to_string(), (meta.clone(), bytes));
        tracing::debug!(key, size = meta.size, "blob uploaded");
        Ok(meta)
    }

    async fn download_url(&self, key: &str) -> Result<String, error::SystemError> {
        if !self.lock().contains_key(key) {
            return Err(error::SystemError::not_found("storage/object-not-found"));
        }
        Ok(format!("{}/{}/o/{}?alt=media", self.base_url, self.bucket, encode_key(key)))
    }

    async fn delete(&self, key: &str) -> Result<(), error::SystemError> {
        self.lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| error::SystemError::not_found("storage/object-not-found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::clock::SystemClock;

    fn store() -> InMemoryBlobStore {
        InMemoryBlobStore::new("http://localhost:9199/v0/b/", "bucket", Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn upload_then_resolve_url() {
        let store = store();
        store.upload("chat_media/u1_u2/1700-foto 1.jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();
        let url = store.download_url("chat_media/u1_u2/1700-foto 1.jpg").await.unwrap();
        assert_eq!(
            url,
            "http://localhost:9199/v0/b/bucket/o/chat_media%2Fu1_u2%2F1700-foto%201.jpg?alt=media"
        );
        assert_eq!(store.metadata("chat_media/u1_u2/1700-foto 1.jpg").unwrap().size, 3);
    }

    #[tokio::test]
    async fn missing_objects_and_outages() {
        let store = store();
        assert!(matches!(store.download_url("nope").await, Err(error::SystemError::NotFound(_))));
        store.set_unavailable(true);
        assert!(store.upload("a/b", vec![], "image/png").await.is_err());
        assert!(store.keys().is_empty());
    }
}
