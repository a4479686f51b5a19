//! Document-store contract: path-addressed JSON documents, filtered queries,
//! atomic batches and realtime listeners.
//!
//! Paths alternate collection and document segments: `conversations/u1_u2` is a
//! document, `conversations/u1_u2/messages` a collection.

use std::{
    cmp::Ordering,
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use chrono::DateTime;
use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::api::error;

pub type Document = Map<String, Value>;

/// Value written to one field of a document. `ServerTimestamp` is filled in
/// with the commit time by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

pub fn server_timestamp() -> FieldValue {
    FieldValue::ServerTimestamp
}

pub fn doc_path(segments: &[&str]) -> String {
    segments.join("/")
}

/// Collection a document path lives in.
pub fn parent_collection(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

pub fn is_document_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').collect();
    segments.len() % 2 == 0 && segments.iter().all(|s| !s.is_empty())
}

/// Resolves a dotted field path (`participantInfo.u1.username`).
pub fn get_field<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let first = doc.get(parts.next()?)?;
    parts.try_fold(first, |node, part| node.get(part))
}

/// Writes a dotted field path, creating intermediate maps.
pub fn set_field(doc: &mut Document, field: &str, value: Value) {
    match field.split_once('.') {
        None => {
            doc.insert(field.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                set_field(map, rest, value);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: String,
    pub data: Option<Document>,
}

impl DocumentSnapshot {
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|doc| get_field(doc, name))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, error::SystemError> {
        match &self.data {
            Some(doc) => Ok(Some(serde_json::from_value(Value::Object(doc.clone()))?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    pub docs: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal(String, Value),
    ArrayContains(String, Value),
    GreaterOrEqual(String, Value),
    LessThan(String, Value),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Equal(field, expected) => get_field(doc, field) == Some(expected),
            Filter::ArrayContains(field, expected) => get_field(doc, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(expected)),
            Filter::GreaterOrEqual(field, bound) => get_field(doc, field).is_some_and(|v| {
                type_rank(v) == type_rank(bound) && compare_values(v, bound) != Ordering::Less
            }),
            Filter::LessThan(field, bound) => get_field(doc, field).is_some_and(|v| {
                type_rank(v) == type_rank(bound) && compare_values(v, bound) == Ordering::Less
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), filters: Vec::new(), order_by: None, limit: None }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Equal(field.to_string(), value.into()));
        self
    }

    pub fn where_array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::GreaterOrEqual(field.to_string(), value.into()));
        self
    }

    pub fn where_lt(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::LessThan(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates the query over `(path, document)` pairs. Documents missing the
    /// ordering field are excluded; without an ordering, results follow path order.
    pub fn evaluate<'a, I>(&self, docs: I) -> QuerySnapshot
    where
        I: IntoIterator<Item = (&'a String, &'a Document)>,
    {
        let mut matched: Vec<(&String, &Document)> = docs
            .into_iter()
            .filter(|(path, _)| parent_collection(path) == self.collection)
            .filter(|(_, doc)| self.filters.iter().all(|f| f.matches(doc)))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            matched.retain(|(_, doc)| get_field(doc, field).is_some());
            matched.sort_by(|(pa, a), (pb, b)| {
                let ord = match (get_field(a, field), get_field(b, field)) {
                    (Some(x), Some(y)) => compare_values(x, y),
                    _ => Ordering::Equal,
                }
                .then_with(|| pa.cmp(pb));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        } else {
            matched.sort_by(|(pa, _), (pb, _)| pa.cmp(pb));
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        QuerySnapshot {
            docs: matched
                .into_iter()
                .map(|(path, doc)| DocumentSnapshot { path: path.clone(), data: Some(doc.clone()) })
                .collect(),
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting and range filters. Strings that both parse as
/// RFC 3339 compare as instants.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(dx), Ok(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replaces the document. Each dotted path in `server_timestamps` is then
    /// set to the commit time.
    Set { path: String, data: Value, server_timestamps: Vec<String> },
    Update { path: String, fields: Vec<(String, FieldValue)> },
    Delete { path: String },
}

impl WriteOp {
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Set { path, .. } | WriteOp::Update { path, .. } | WriteOp::Delete { path } => {
                path
            }
        }
    }
}

/// Writes applied all-or-nothing by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, data: Value) -> &mut Self {
        self.set_with_server_timestamps(path, data, &[])
    }

    pub fn set_with_server_timestamps(
        &mut self,
        path: impl Into<String>,
        data: Value,
        fields: &[&str],
    ) -> &mut Self {
        self.ops.push(WriteOp::Set {
            path: path.into(),
            data,
            server_timestamps: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn update(&mut self, path: impl Into<String>, fields: Vec<(String, FieldValue)>) -> &mut Self {
        self.ops.push(WriteOp::Update { path: path.into(), fields });
        self
    }

    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { path: path.into() });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Releases a listener exactly once, when dropped.
pub struct ListenerRegistration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

pub type SnapshotResult<T> = Result<T, error::SystemError>;

/// Live feed of snapshots. The first item is the state at subscription time;
/// dropping the handle unregisters the listener.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<SnapshotResult<T>>,
    _registration: ListenerRegistration,
}

impl<T> Subscription<T> {
    pub fn new(
        rx: mpsc::UnboundedReceiver<SnapshotResult<T>>,
        registration: ListenerRegistration,
    ) -> Self {
        Self { rx, _registration: registration }
    }

    pub async fn recv(&mut self) -> Option<SnapshotResult<T>> {
        self.rx.recv().await
    }

    /// Returns an already delivered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<SnapshotResult<T>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = SnapshotResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Polls an optional subscription held by a view. A closed feed empties the
/// slot and stays pending.
pub fn poll_slot<T>(
    slot: &mut Option<Subscription<T>>,
    cx: &mut Context<'_>,
) -> Poll<SnapshotResult<T>> {
    let Some(subscription) = slot.as_mut() else {
        return Poll::Pending;
    };
    match subscription.rx.poll_recv(cx) {
        Poll::Ready(Some(item)) => Poll::Ready(item),
        Poll::Ready(None) => {
            *slot = None;
            Poll::Pending
        }
        Poll::Pending => Poll::Pending,
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<DocumentSnapshot, error::SystemError>;

    async fn query(&self, query: &Query) -> Result<QuerySnapshot, error::SystemError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), error::SystemError>;

    /// Fresh id for a document created with an auto id.
    fn new_id(&self) -> String;

    fn listen_document(&self, path: &str) -> Subscription<DocumentSnapshot>;

    fn listen_query(&self, query: Query) -> Subscription<QuerySnapshot>;

    async fn set(&self, path: &str, data: Value) -> Result<(), error::SystemError> {
        self.set_with_server_timestamps(path, data, &[]).await
    }

    async fn set_with_server_timestamps(
        &self,
        path: &str,
        data: Value,
        fields: &[&str],
    ) -> Result<(), error::SystemError> {
        let mut batch = WriteBatch::new();
        batch.set_with_server_timestamps(path, data, fields);
        self.commit(batch).await
    }

    /// Fails with `NotFound` when the document does not exist.
    async fn update(
        &self,
        path: &str,
        fields: Vec<(String, FieldValue)>,
    ) -> Result<(), error::SystemError> {
        let mut batch = WriteBatch::new();
        batch.update(path, fields);
        self.commit(batch).await
    }

    async fn delete(&self, path: &str) -> Result<(), error::SystemError> {
        let mut batch = WriteBatch::new();
        batch.delete(path);
        self.commit(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(entries: Vec<(&str, Value)>) -> Vec<(String, Document)> {
        entries
            .into_iter()
            .filter_map(|(p, v)| match v {
                Value::Object(map) => Some((p.to_string(), map)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn dotted_fields_round_through_nested_maps() {
        let mut doc = Document::new();
        set_field(&mut doc, "participantInfo.u1.lastSeenMessageTimestamp", json!("t"));
        set_field(&mut doc, "participantInfo.u1.username", json!("ana"));
        assert_eq!(get_field(&doc, "participantInfo.u1.username"), Some(&json!("ana")));
        assert_eq!(get_field(&doc, "participantInfo.u1.lastSeenMessageTimestamp"), Some(&json!("t")));
        assert_eq!(get_field(&doc, "participantInfo.u2"), None);
    }

    #[test]
    fn path_helpers() {
        assert!(is_document_path("conversations/u1_u2"));
        assert!(is_document_path("conversations/u1_u2/messages/m1"));
        assert!(!is_document_path("conversations"));
        assert!(!is_document_path("conversations//x/"));
        assert_eq!(parent_collection("conversations/u1_u2/messages/m1"), "conversations/u1_u2/messages");
    }

    #[test]
    fn query_filters_orders_and_limits() {
        let data = docs(vec![
            ("c/a", json!({"participants": ["u1", "u2"], "ts": "2024-01-01T00:00:02.000000Z"})),
            ("c/b", json!({"participants": ["u1", "u3"], "ts": "2024-01-01T00:00:01.500000Z"})),
            ("c/c", json!({"participants": ["u2", "u3"], "ts": "2024-01-01T00:00:03.000000Z"})),
            ("c/d", json!({"participants": ["u1", "u4"]})),
            ("other/e", json!({"participants": ["u1"]})),
        ]);

        let q = Query::new("c").where_array_contains("participants", "u1");
        let ids: Vec<_> = q.evaluate(data.iter().map(|(p, d)| (p, d))).docs.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);

        let q = Query::new("c").order_by("ts", Direction::Descending).limit(2);
        let ids: Vec<_> = q.evaluate(data.iter().map(|(p, d)| (p, d))).docs.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let a = json!("2024-01-01T00:00:01.5Z");
        let b = json!("2024-01-01T00:00:01.25Z");
        assert_eq!(compare_values(&a, &b), Ordering::Greater);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(null), &json!("x")), Ordering::Less);
    }

    #[test]
    fn range_filters_implement_prefix_search() {
        let data = docs(vec![
            ("users/1", json!({"username": "ana"})),
            ("users/2", json!({"username": "anabela"})),
            ("users/3", json!({"username": "bruno"})),
        ]);
        let q = Query::new("users").where_gte("username", "ana").where_lt("username", "ana\u{f8ff}");
        assert_eq!(q.evaluate(data.iter().map(|(p, d)| (p, d))).len(), 2);
    }

    #[test]
    fn dropping_registration_releases_once() {
        use std::sync::{
            atomic::{AtomicUsize, Ordering as AtomicOrdering},
            Arc,
        };
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let (_tx, rx) = mpsc::unbounded_channel::<SnapshotResult<()>>();
        let sub = Subscription::new(rx, ListenerRegistration::new(move || {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        drop(sub);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }
}
