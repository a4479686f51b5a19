use std::sync::Arc;

use serde_json::json;

use crate::{
    api::error,
    modules::notification::schema::{NewNotification, NotificationEntity, NotificationKind},
    platform::document::{doc_path, Direction, DocumentStore, Query, WriteBatch},
};

pub fn notifications_collection(uid: &str) -> String {
    doc_path(&["users", uid, "notifications"])
}

#[derive(Clone)]
pub struct NotificationDocRepository {
    db: Arc<dyn DocumentStore>,
}

impl NotificationDocRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    /// Adds the recipient's notification to `batch`; returns its id.
    pub fn stage_create(&self, batch: &mut WriteBatch, notification: &NewNotification) -> String {
        let id = self.db.new_id();
        batch.set_with_server_timestamps(
            format!("{}/{id}", notifications_collection(&notification.recipient_id)),
            json!({
                "type": NotificationKind::Message,
                "fromUserId": notification.from_user_id,
                "fromUsername": notification.from_username,
                "fromUserAvatar": notification.from_user_avatar,
                "conversationId": notification.conversation_id,
                "read": false,
            }),
            &["timestamp"],
        );
        id
    }

    /// Newest first.
    pub async fn list_for(&self, uid: &str) -> Result<Vec<NotificationEntity>, error::SystemError> {
        let query = Query::new(notifications_collection(uid)).order_by("timestamp", Direction::Descending);
        let snapshot = self.db.query(&query).await?;
        let mut notifications = Vec::with_capacity(snapshot.len());
        for doc in &snapshot.docs {
            if let Some(notification) = NotificationEntity::from_snapshot(doc)? {
                notifications.push(notification);
            }
        }
        Ok(notifications)
    }
}
