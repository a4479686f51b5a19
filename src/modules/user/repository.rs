use crate::{
    api::error,
    modules::user::{
        model::{InsertUser, UpdateUser},
        schema::UserEntity,
    },
    platform::document::{DocumentSnapshot, Subscription},
};

#[async_trait::async_trait]
pub trait UserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserEntity>, error::SystemError>;

    async fn create(&self, id: &str, user: &InsertUser) -> Result<(), error::SystemError>;

    async fn update(&self, id: &str, user: &UpdateUser) -> Result<(), error::SystemError>;

    async fn touch_last_seen(&self, id: &str) -> Result<(), error::SystemError>;

    async fn set_push_token(&self, id: &str, token: &str) -> Result<(), error::SystemError>;

    /// Users whose username starts with `prefix` (case-sensitive), ordered by username.
    async fn search_by_username_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<UserEntity>, error::SystemError>;

    fn watch(&self, id: &str) -> Subscription<DocumentSnapshot>;
}
