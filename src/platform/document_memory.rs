//! In-process document store with realtime listeners.
//!
//! Every commit is applied under one lock, so a batch is observed by listeners
//! either entirely or not at all. Server timestamps are strictly increasing.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::error,
    platform::{
        clock::Clock,
        document::{
            is_document_path, parent_collection, set_field, Document, FieldValue,
            DocumentSnapshot, DocumentStore, ListenerRegistration, Query, QuerySnapshot,
            SnapshotResult, Subscription, WriteBatch, WriteOp,
        },
    },
};

enum Listener {
    Document { path: String, tx: mpsc::UnboundedSender<SnapshotResult<DocumentSnapshot>> },
    Query { query: Query, tx: mpsc::UnboundedSender<SnapshotResult<QuerySnapshot>> },
}

#[derive(Default)]
struct StoreInner {
    docs: BTreeMap<String, Document>,
    listeners: HashMap<u64, Listener>,
    next_listener: u64,
    last_timestamp: Option<DateTime<Utc>>,
    unavailable: Option<String>,
    commits: usize,
}

impl StoreInner {
    fn add_listener(&mut self, listener: Listener) -> u64 {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, listener);
        id
    }

    fn snapshot(&self, path: &str) -> DocumentSnapshot {
        DocumentSnapshot { path: path.to_string(), data: self.docs.get(path).cloned() }
    }

    fn next_timestamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(6);
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn notify<'a>(&mut self, touched: impl Iterator<Item = &'a String> + Clone) {
        let StoreInner { docs, listeners, .. } = self;
        listeners.retain(|_, listener| match listener {
            Listener::Document { path, tx } => {
                if touched.clone().any(|p| p == path) {
                    let snapshot = DocumentSnapshot { path: path.clone(), data: docs.get(path).cloned() };
                    tx.send(Ok(snapshot)).is_ok()
                } else {
                    !tx.is_closed()
                }
            }
            Listener::Query { query, tx } => {
                if touched.clone().any(|p| parent_collection(p) == query.collection) {
                    tx.send(Ok(query.evaluate(docs.iter()))).is_ok()
                } else {
                    !tx.is_closed()
                }
            }
        });
    }
}

#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<StoreInner>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDocumentStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { inner: Arc::new(Mutex::new(StoreInner::default())), clock }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every following commit fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.lock().unavailable = reason.map(str::to_string);
    }

    pub fn listener_count(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|_, l| match l {
            Listener::Document { tx, .. } => !tx.is_closed(),
            Listener::Query { tx, .. } => !tx.is_closed(),
        });
        inner.listeners.len()
    }

    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    fn registration(&self, id: u64) -> ListenerRegistration {
        let weak = Arc::downgrade(&self.inner);
        ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                inner.listeners.remove(&id);
            }
        })
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<DocumentSnapshot, error::SystemError> {
        if !is_document_path(path) {
            return Err(error::SystemError::bad_request(format!("Invalid document path: {path}")));
        }
        Ok(self.lock().snapshot(path))
    }

    async fn query(&self, query: &Query) -> Result<QuerySnapshot, error::SystemError> {
        Ok(query.evaluate(self.lock().docs.iter()))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), error::SystemError> {
        let mut inner = self.lock();

        if let Some(reason) = inner.unavailable.clone() {
            return Err(error::SystemError::unavailable(reason));
        }

        let now = inner.next_timestamp(self.clock.now());
        let stamp = Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true));

        // Stage every op first; nothing is applied if any op is invalid.
        let mut staged: BTreeMap<String, Option<Document>> = BTreeMap::new();
        for op in batch.into_ops() {
            if !is_document_path(op.path()) {
                return Err(error::SystemError::bad_request(format!(
                    "Invalid document path: {}",
                    op.path()
                )));
            }

            match op {
                WriteOp::Set { path, data, server_timestamps } => {
                    let Value::Object(mut doc) = data else {
                        return Err(error::SystemError::bad_request("Document data must be a map"));
                    };
                    for field in &server_timestamps {
                        set_field(&mut doc, field, stamp.clone());
                    }
                    staged.insert(path, Some(doc));
                }
                WriteOp::Update { path, fields } => {
                    let current = match staged.get(&path) {
                        Some(doc) => doc.clone(),
                        None => inner.docs.get(&path).cloned(),
                    };
                    let Some(mut doc) = current else {
                        return Err(error::SystemError::not_found(format!(
                            "No document to update: {path}"
                        )));
                    };
                    for (field, value) in fields {
                        let value = match value {
                            FieldValue::Value(value) => value,
                            FieldValue::ServerTimestamp => stamp.clone(),
                        };
                        set_field(&mut doc, &field, value);
                    }
                    staged.insert(path, Some(doc));
                }
                WriteOp::Delete { path } => {
                    staged.insert(path, None);
                }
            }
        }

        for (path, doc) in &staged {
            match doc {
                Some(doc) => {
                    inner.docs.insert(path.clone(), doc.clone());
                }
                None => {
                    inner.docs.remove(path);
                }
            }
        }
        inner.commits += 1;

        tracing::debug!(writes = staged.len(), at = %stamp, "batch committed");
        inner.notify(staged.keys());
        Ok(())
    }

    fn new_id(&self) -> String {
        Uuid::now_v7().simple().to_string()
    }

    fn listen_document(&self, path: &str) -> Subscription<DocumentSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let _ = tx.send(Ok(inner.snapshot(path)));
            inner.add_listener(Listener::Document { path: path.to_string(), tx })
        };
        Subscription::new(rx, self.registration(id))
    }

    fn listen_query(&self, query: Query) -> Subscription<QuerySnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let _ = tx.send(Ok(query.evaluate(inner.docs.iter())));
            inner.add_listener(Listener::Query { query, tx })
        };
        Subscription::new(rx, self.registration(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{clock::ManualClock, document::Direction};
    use chrono::TimeZone;
    use serde_json::json;

    fn store() -> InMemoryDocumentStore {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        InMemoryDocumentStore::new(Arc::new(clock))
    }

    #[tokio::test]
    async fn server_timestamps_are_strictly_increasing() {
        let store = store();
        store.set_with_server_timestamps("m/a", json!({}), &["timestamp"]).await.unwrap();
        store.set_with_server_timestamps("m/b", json!({}), &["timestamp"]).await.unwrap();

        let snap = store
            .query(&Query::new("m").order_by("timestamp", Direction::Ascending))
            .await
            .unwrap();
        let ids: Vec<_> = snap.docs.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_ne!(snap.docs[0].field("timestamp"), snap.docs[1].field("timestamp"));
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = store();
        let mut batch = WriteBatch::new();
        batch.set("c/one", json!({"x": 1}));
        batch.update("c/missing", vec![("x".into(), json!(2).into())]);

        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
        assert!(!store.get("c/one").await.unwrap().exists());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_store_rejects_writes() {
        let store = store();
        store.set_unavailable(Some("offline"));
        assert!(store.set("c/one", json!({})).await.is_err());
        store.set_unavailable(None);
        assert!(store.set("c/one", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn listeners_get_initial_and_subsequent_snapshots() {
        let store = store();
        let mut doc_sub = store.listen_document("c/one");
        let mut query_sub = store.listen_query(Query::new("c"));

        assert!(!doc_sub.recv().await.unwrap().unwrap().exists());
        assert!(query_sub.recv().await.unwrap().unwrap().is_empty());

        store.set("c/one", json!({"x": 1})).await.unwrap();
        let snap = doc_sub.recv().await.unwrap().unwrap();
        assert_eq!(snap.field("x"), Some(&json!(1)));
        assert_eq!(query_sub.recv().await.unwrap().unwrap().len(), 1);

        // writes elsewhere do not wake these listeners
        store.set("d/other", json!({})).await.unwrap();
        assert!(doc_sub.try_recv().is_none());
        assert!(query_sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters_listener() {
        let store = store();
        let a = store.listen_document("c/one");
        let b = store.listen_query(Query::new("c"));
        assert_eq!(store.listener_count(), 2);
        drop(a);
        assert_eq!(store.listener_count(), 1);
        drop(b);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn update_merges_dotted_paths() {
        let store = store();
        store.set("c/one", json!({"info": {"u1": {"username": "ana"}}})).await.unwrap();
        store
            .update("c/one", vec![("info.u1.seen".into(), json!(true).into())])
            .await
            .unwrap();
        let snap = store.get("c/one").await.unwrap();
        assert_eq!(snap.field("info.u1.username"), Some(&json!("ana")));
        assert_eq!(snap.field("info.u1.seen"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn only_marked_fields_get_the_commit_time() {
        let store = store();
        store
            .set_with_server_timestamps(
                "c/one",
                json!({"text": "__serverTimestamp__", "nested": {"note": "x"}}),
                &["createdAt", "nested.at"],
            )
            .await
            .unwrap();
        store
            .update(
                "c/one",
                vec![
                    ("caption".into(), json!("__serverTimestamp__").into()),
                    ("seenAt".into(), FieldValue::ServerTimestamp),
                ],
            )
            .await
            .unwrap();

        let snap = store.get("c/one").await.unwrap();
        assert_eq!(snap.field("text"), Some(&json!("__serverTimestamp__")));
        assert_eq!(snap.field("caption"), Some(&json!("__serverTimestamp__")));
        assert_eq!(snap.field("nested.note"), Some(&json!("x")));
        assert_eq!(snap.field("createdAt"), Some(&json!("2024-05-01T12:00:00.000000Z")));
        assert!(snap.field("nested.at").is_some());
        assert_eq!(snap.field("seenAt"), Some(&json!("2024-05-01T12:00:00.000001Z")));
    }
}
