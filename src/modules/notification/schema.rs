use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::error, i18n::t, platform::document::DocumentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
}

/// `users/{uid}/notifications/{auto}` as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntity {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from_user_id: String,
    #[serde(default)]
    pub from_username: String,
    #[serde(default)]
    pub from_user_avatar: String,
    pub conversation_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}

impl NotificationEntity {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>, error::SystemError> {
        Ok(snapshot.decode::<NotificationEntity>()?.map(|mut notification| {
            notification.id = snapshot.id().to_string();
            notification
        }))
    }

    /// Header line such as "bia te enviou uma mensagem."
    pub fn text(&self) -> String {
        match self.kind {
            NotificationKind::Message => {
                t("header.messageNotification", &[("username", self.from_username.as_str())])
            }
        }
    }
}

/// Notification written to the recipient together with a message.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: String,
    pub from_user_id: String,
    pub from_username: String,
    pub from_user_avatar: String,
    pub conversation_id: String,
}
