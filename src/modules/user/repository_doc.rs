use std::sync::Arc;

use serde_json::{json, Value};

use crate::{
    api::error,
    modules::user::{
        model::{InsertUser, UpdateUser},
        repository::UserRepository,
        schema::UserEntity,
    },
    platform::document::{
        doc_path, server_timestamp, Direction, DocumentSnapshot, DocumentStore, FieldValue, Query,
        Subscription,
    },
};

pub const USERS: &str = "users";

pub fn user_path(id: &str) -> String {
    doc_path(&[USERS, id])
}

#[derive(Clone)]
pub struct UserDocRepository {
    db: Arc<dyn DocumentStore>,
}

impl UserDocRepository {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl UserRepository for UserDocRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserEntity>, error::SystemError> {
        let snapshot = self.db.get(&user_path(id)).await?;
        UserEntity::from_snapshot(&snapshot)
    }

    async fn create(&self, id: &str, user: &InsertUser) -> Result<(), error::SystemError> {
        self.db
            .set_with_server_timestamps(
                &user_path(id),
                json!({
                    "username": user.username,
                    "email": user.email,
                    "avatar": user.avatar,
                    "bio": "",
                    "isPrivate": false,
                }),
                &["createdAt"],
            )
            .await
    }

    async fn update(&self, id: &str, user: &UpdateUser) -> Result<(), error::SystemError> {
        let mut fields: Vec<(String, FieldValue)> = vec![
            ("username".to_string(), Value::from(user.username.clone()).into()),
            ("bio".to_string(), Value::from(user.bio.clone()).into()),
            ("isPrivate".to_string(), Value::from(user.is_private).into()),
        ];
        if let Some(avatar) = &user.avatar {
            fields.push(("avatar".to_string(), Value::from(avatar.clone()).into()));
        }
        self.db.update(&user_path(id), fields).await
    }

    async fn touch_last_seen(&self, id: &str) -> Result<(), error::SystemError> {
        self.db.update(&user_path(id), vec![("lastSeen".to_string(), server_timestamp())]).await
    }

    async fn set_push_token(&self, id: &str, token: &str) -> Result<(), error::SystemError> {
        self.db.update(&user_path(id), vec![("fcmToken".to_string(), Value::from(token).into())]).await
    }

    async fn search_by_username_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<UserEntity>, error::SystemError> {
        let query = Query::new(USERS)
            .where_gte("username", prefix)
            .where_lt("username", format!("{prefix}\u{f8ff}"))
            .order_by("username", Direction::Ascending)
            .limit(limit);

        let snapshot = self.db.query(&query).await?;
        let mut users = Vec::with_capacity(snapshot.len());
        for doc in &snapshot.docs {
            if let Some(user) = UserEntity::from_snapshot(doc)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn watch(&self, id: &str) -> Subscription<DocumentSnapshot> {
        self.db.listen_document(&user_path(id))
    }
}
