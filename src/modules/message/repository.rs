use crate::{
    api::error,
    modules::message::{model::InsertMessage, schema::MessageEntity},
    platform::document::{QuerySnapshot, Subscription, WriteBatch},
};

#[async_trait::async_trait]
pub trait MessageRepository {
    async fn find_by_id(
        &self,
        conversation_id: &str,
        id: &str,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    /// Most recent message still in the conversation.
    async fn latest(&self, conversation_id: &str) -> Result<Option<MessageEntity>, error::SystemError>;

    async fn delete(&self, conversation_id: &str, id: &str) -> Result<(), error::SystemError>;

    /// Adds the message to `batch` with a server timestamp; returns its id.
    fn stage_create(
        &self,
        batch: &mut WriteBatch,
        conversation_id: &str,
        message: &InsertMessage,
    ) -> Result<String, error::SystemError>;

    /// Messages ordered by timestamp, oldest first.
    fn watch_ordered(&self, conversation_id: &str) -> Subscription<QuerySnapshot>;
}
