use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::error, modules::message::schema::MediaKind, platform::document::DocumentSnapshot};

/// Freshness scale, declared from most decayed to freshest so that
/// `Brilhante` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrystalLevel {
    Rachado,
    Apagado,
    Equilibrado,
    Brilhante,
}

impl CrystalLevel {
    pub fn key(&self) -> &'static str {
        match self {
            CrystalLevel::Brilhante => "crystal.level.brilhante",
            CrystalLevel::Equilibrado => "crystal.level.equilibrado",
            CrystalLevel::Apagado => "crystal.level.apagado",
            CrystalLevel::Rachado => "crystal.level.rachado",
        }
    }
}

/// Stored crystal sub-record. `level` is whatever the last writer put there
/// and is never read back as truth.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrystalRecord {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub level: Option<CrystalLevel>,
    #[serde(default)]
    pub streak: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub last_seen_message_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
}

/// `conversations/{a_b}` as stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntity {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub participant_info: HashMap<String, ParticipantInfo>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub crystal: Option<CrystalRecord>,
}

impl ConversationEntity {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>, error::SystemError> {
        Ok(snapshot.decode::<ConversationEntity>()?.map(|mut conversation| {
            conversation.id = snapshot.id().to_string();
            conversation
        }))
    }

    /// The other participant, if the document names one.
    pub fn peer_of(&self, me: &str) -> Option<&str> {
        self.participants.iter().map(String::as_str).find(|uid| *uid != me)
    }

    pub fn watermark_of(&self, uid: &str) -> Option<DateTime<Utc>> {
        self.participant_info.get(uid).and_then(|info| info.last_seen_message_timestamp)
    }
}
