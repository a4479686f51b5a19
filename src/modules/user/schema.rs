use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::error, constants::PRESENCE_WINDOW_SECS, platform::document::DocumentSnapshot};

/// `users/{uid}` as stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserEntity {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>, error::SystemError> {
        Ok(snapshot.decode::<UserEntity>()?.map(|mut user| {
            user.id = snapshot.id().to_string();
            user
        }))
    }

    /// Online iff the last heartbeat is younger than the presence window.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.last_seen
            .is_some_and(|seen| (now - seen).num_seconds() < PRESENCE_WINDOW_SECS)
    }
}
