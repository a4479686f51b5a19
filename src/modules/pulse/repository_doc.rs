use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use crate::{
    api::error,
    modules::pulse::{model::InsertPulse, repository::PulseRepository, schema::PulseEntity},
    platform::document::{doc_path, Direction, DocumentStore, Query, QuerySnapshot, Subscription},
};

pub const PULSES: &str = "pulses";

pub fn pulse_path(id: &str) -> String {
    doc_path(&[PULSES, id])
}

pub fn views_collection(id: &str) -> String {
    doc_path(&[PULSES, id, "views"])
}

#[derive(Clone)]
pub struct PulseDocRepository {
    db: Arc<dyn DocumentStore>,
}

impl PulseDocRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl PulseRepository for PulseDocRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<PulseEntity>, error::SystemError> {
        let snapshot = self.db.get(&pulse_path(id)).await?;
        PulseEntity::from_snapshot(&snapshot)
    }

    async fn create(&self, pulse: &InsertPulse) -> Result<String, error::SystemError> {
        let id = self.db.new_id();
        self.db
            .set_with_server_timestamps(
                &pulse_path(&id),
                json!({
                    "authorId": pulse.author_id,
                    "mediaUrl": pulse.media_url,
                    "legenda": pulse.caption,
                }),
                &["createdAt"],
            )
            .await?;
        Ok(id)
    }

    async fn list_since(
        &self,
        author_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PulseEntity>, error::SystemError> {
        let query = Query::new(PULSES)
            .where_eq("authorId", author_id)
            .where_gte("createdAt", since.to_rfc3339_opts(SecondsFormat::Micros, true))
            .order_by("createdAt", Direction::Ascending);
        let snapshot = self.db.query(&query).await?;

        let mut pulses = Vec::with_capacity(snapshot.len());
        for doc in &snapshot.docs {
            if let Some(pulse) = PulseEntity::from_snapshot(doc)? {
                pulses.push(pulse);
            }
        }
        Ok(pulses)
    }

    async fn delete(&self, id: &str) -> Result<(), error::SystemError> {
        self.db.delete(&pulse_path(id)).await
    }

    async fn record_view(&self, id: &str, viewer_id: &str) -> Result<(), error::SystemError> {
        let path = doc_path(&[PULSES, id, "views", viewer_id]);
        self.db.set_with_server_timestamps(&path, json!({ "userId": viewer_id }), &["viewedAt"]).await
    }

    fn watch_views(&self, id: &str) -> Subscription<QuerySnapshot> {
        self.db.listen_query(Query::new(views_collection(id)))
    }
}
