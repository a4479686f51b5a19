use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::{
    api::error,
    modules::conversation::{
        model::{ConversationActivity, NewConversation},
        repository::ConversationRepository,
        schema::{ConversationEntity, CrystalLevel, LastMessage},
    },
    platform::document::{
        doc_path, server_timestamp, DocumentSnapshot, DocumentStore, FieldValue, Query,
        QuerySnapshot, Subscription, WriteBatch,
    },
};

pub const CONVERSATIONS: &str = "conversations";

pub fn conversation_path(id: &str) -> String {
    doc_path(&[CONVERSATIONS, id])
}

fn rfc3339(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn last_message_value(last: &LastMessage) -> Value {
    json!({
        "text": last.text,
        "senderId": last.sender_id,
        "timestamp": last.timestamp.map(rfc3339),
        "mediaType": last.media_type,
    })
}

#[derive(Clone)]
pub struct ConversationDocRepository {
    db: Arc<dyn DocumentStore>,
}

impl ConversationDocRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationDocRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ConversationEntity>, error::SystemError> {
        let snapshot = self.db.get(&conversation_path(id)).await?;
        ConversationEntity::from_snapshot(&snapshot)
    }

    async fn create(&self, conversation: &NewConversation) -> Result<(), error::SystemError> {
        let mut info = Map::new();
        for seed in &conversation.participants {
            info.insert(
                seed.uid.clone(),
                json!({
                    "username": seed.username,
                    "avatar": seed.avatar,
                    "lastSeenMessageTimestamp": null,
                }),
            );
        }
        let participants: Vec<&str> =
            conversation.participants.iter().map(|seed| seed.uid.as_str()).collect();

        self.db
            .set_with_server_timestamps(
                &conversation_path(&conversation.id),
                json!({
                    "participants": participants,
                    "participantInfo": info,
                    "crystal": {
                        "level": CrystalLevel::Brilhante,
                        "streak": 1,
                    },
                }),
                &["timestamp", "crystal.createdAt", "crystal.lastInteractionAt"],
            )
            .await
    }

    async fn touch(&self, id: &str) -> Result<(), error::SystemError> {
        self.db
            .update(&conversation_path(id), vec![("timestamp".to_string(), server_timestamp())])
            .await
    }

    async fn set_last_message(
        &self,
        id: &str,
        last_message: Option<&LastMessage>,
    ) -> Result<(), error::SystemError> {
        let value = last_message.map(last_message_value).unwrap_or(Value::Null);
        self.db.update(&conversation_path(id), vec![("lastMessage".to_string(), value.into())]).await
    }

    async fn set_watermark(
        &self,
        id: &str,
        uid: &str,
        seen: DateTime<Utc>,
    ) -> Result<(), error::SystemError> {
        self.db
            .update(
                &conversation_path(id),
                vec![(format!("participantInfo.{uid}.lastSeenMessageTimestamp"), rfc3339(seen).into())],
            )
            .await
    }

    fn stage_activity(&self, batch: &mut WriteBatch, id: &str, activity: &ConversationActivity) {
        let created_at = activity
            .crystal_created_at
            .map(|ts| FieldValue::from(rfc3339(ts)))
            .unwrap_or_else(server_timestamp);
        batch.update(
            conversation_path(id),
            vec![
                (
                    "lastMessage".to_string(),
                    json!({
                        "text": activity.text,
                        "senderId": activity.sender_id,
                        "mediaType": activity.media_type,
                    })
                    .into(),
                ),
                ("lastMessage.timestamp".to_string(), server_timestamp()),
                ("timestamp".to_string(), server_timestamp()),
                (
                    "crystal".to_string(),
                    json!({
                        "level": CrystalLevel::Brilhante,
                        "streak": activity.streak,
                    })
                    .into(),
                ),
                ("crystal.createdAt".to_string(), created_at),
                ("crystal.lastInteractionAt".to_string(), server_timestamp()),
            ],
        );
    }

    fn watch(&self, id: &str) -> Subscription<DocumentSnapshot> {
        self.db.listen_document(&conversation_path(id))
    }

    fn watch_for_user(&self, uid: &str) -> Subscription<QuerySnapshot> {
        self.db.listen_query(Query::new(CONVERSATIONS).where_array_contains("participants", uid))
    }
}
