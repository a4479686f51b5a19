use std::sync::Arc;

use serde_json::{Map, Value};

use crate::{
    api::error,
    modules::message::{model::InsertMessage, repository::MessageRepository, schema::MessageEntity},
    platform::document::{
        doc_path, Direction, DocumentStore, Query, QuerySnapshot, Subscription,
        WriteBatch,
    },
};

pub fn messages_collection(conversation_id: &str) -> String {
    doc_path(&["conversations", conversation_id, "messages"])
}

fn message_path(conversation_id: &str, id: &str) -> String {
    format!("{}/{id}", messages_collection(conversation_id))
}

#[derive(Clone)]
pub struct MessageDocRepository {
    db: Arc<dyn DocumentStore>,
}

impl MessageDocRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }
}

fn insert_document(message: &InsertMessage) -> Result<Value, serde_json::Error> {
    let mut doc = Map::new();
    doc.insert("senderId".into(), Value::from(message.sender_id.clone()));
    doc.insert("text".into(), Value::from(message.text.clone()));
    if let Some(reply_to) = &message.reply_to {
        doc.insert("replyTo".into(), serde_json::to_value(reply_to)?);
    }
    if let Some(url) = &message.media_url {
        doc.insert("mediaUrl".into(), Value::from(url.clone()));
    }
    if let Some(kind) = message.media_type {
        doc.insert("mediaType".into(), serde_json::to_value(kind)?);
    }
    if let Some(post) = &message.forwarded_post_data {
        doc.insert("forwardedPostData".into(), serde_json::to_value(post)?);
    }
    Ok(Value::Object(doc))
}

#[async_trait::async_trait]
impl MessageRepository for MessageDocRepository {
    async fn find_by_id(
        &self,
        conversation_id: &str,
        id: &str,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let snapshot = self.db.get(&message_path(conversation_id, id)).await?;
        MessageEntity::from_snapshot(&snapshot)
    }

    async fn latest(&self, conversation_id: &str) -> Result<Option<MessageEntity>, error::SystemError> {
        let query = Query::new(messages_collection(conversation_id))
            .order_by("timestamp", Direction::Descending)
            .limit(1);
        let snapshot = self.db.query(&query).await?;
        match snapshot.docs.first() {
            Some(doc) => MessageEntity::from_snapshot(doc),
            None => Ok(None),
        }
    }

    async fn delete(&self, conversation_id: &str, id: &str) -> Result<(), error::SystemError> {
        self.db.delete(&message_path(conversation_id, id)).await
    }

    fn stage_create(
        &self,
        batch: &mut WriteBatch,
        conversation_id: &str,
        message: &InsertMessage,
    ) -> Result<String, error::SystemError> {
        let id = self.db.new_id();
        batch.set_with_server_timestamps(
            message_path(conversation_id, &id),
            insert_document(message)?,
            &["timestamp"],
        );
        Ok(id)
    }

    fn watch_ordered(&self, conversation_id: &str) -> Subscription<QuerySnapshot> {
        self.db.listen_query(
            Query::new(messages_collection(conversation_id)).order_by("timestamp", Direction::Ascending),
        )
    }
}
