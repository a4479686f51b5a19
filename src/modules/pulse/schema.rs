use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{api::error, platform::document::DocumentSnapshot};

pub const PULSE_LIFETIME_HOURS: i64 = 24;

/// `pulses/{auto}` as stored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseEntity {
    #[serde(skip)]
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default, rename = "legenda")]
    pub caption: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PulseEntity {
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Result<Option<Self>, error::SystemError> {
        Ok(snapshot.decode::<PulseEntity>()?.map(|mut pulse| {
            pulse.id = snapshot.id().to_string();
            pulse
        }))
    }

    pub fn is_video(&self) -> bool {
        self.media_url.contains(".mp4") || self.media_url.contains(".webm")
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.map(|created| created + Duration::hours(PULSE_LIFETIME_HOURS))
    }
}

/// `pulses/{id}/views/{viewerUid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseView {
    pub user_id: String,
    #[serde(default)]
    pub viewed_at: Option<DateTime<Utc>>,
}
