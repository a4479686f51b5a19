use chrono::{DateTime, Utc};

use crate::modules::message::schema::MediaKind;

/// Denormalized participant data copied into a new conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSeed {
    pub uid: String,
    pub username: String,
    pub avatar: String,
}

pub struct NewConversation {
    pub id: String,
    pub participants: [ParticipantSeed; 2],
}

/// Summary fields rewritten on the conversation whenever a message is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationActivity {
    pub text: String,
    pub sender_id: String,
    pub media_type: Option<MediaKind>,
    /// Preserved from the existing crystal; `None` stamps server time.
    pub crystal_created_at: Option<DateTime<Utc>>,
    pub streak: u32,
}
