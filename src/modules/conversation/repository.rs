use chrono::{DateTime, Utc};

use crate::{
    api::error,
    modules::conversation::{
        model::{ConversationActivity, NewConversation},
        schema::{ConversationEntity, LastMessage},
    },
    platform::document::{DocumentSnapshot, QuerySnapshot, Subscription, WriteBatch},
};

#[async_trait::async_trait]
pub trait ConversationRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ConversationEntity>, error::SystemError>;

    async fn create(&self, conversation: &NewConversation) -> Result<(), error::SystemError>;

    /// Bumps the last-activity marker only.
    async fn touch(&self, id: &str) -> Result<(), error::SystemError>;

    async fn set_last_message(
        &self,
        id: &str,
        last_message: Option<&LastMessage>,
    ) -> Result<(), error::SystemError>;

    async fn set_watermark(
        &self,
        id: &str,
        uid: &str,
        seen: DateTime<Utc>,
    ) -> Result<(), error::SystemError>;

    /// Adds the summary update that accompanies a new message to `batch`.
    fn stage_activity(&self, batch: &mut WriteBatch, id: &str, activity: &ConversationActivity);

    fn watch(&self, id: &str) -> Subscription<DocumentSnapshot>;

    fn watch_for_user(&self, uid: &str) -> Subscription<QuerySnapshot>;
}
