use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::error, platform::document::DocumentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    ForwardedPost,
}

/// Copy of the replied-to message taken when the reply was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTo {
    pub message_id: String,
    pub sender_id: String,
    pub sender_username: String,
    #[serde(default)]
    pub text: String,
}

/// Copy of a shared feed post taken when it was forwarded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedPost {
    pub post_id: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub original_poster_username: String,
    #[serde(default)]
    pub original_poster_avatar: String,
    #[serde(default)]
    pub caption: String,
}

/// `conversations/{id}/messages/{auto}` as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntity {
    #[serde(skip)]
    pub id: String,
    pub sender_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded_post_data: Option<ForwardedPost>,
}

impl MessageEntity {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>, error::SystemError> {
        Ok(snapshot.decode::<MessageEntity>()?.map(|mut message| {
            message.id = snapshot.id().to_string();
            message
        }))
    }
}
