use chrono::{DateTime, Utc};

use crate::{
    api::error,
    modules::pulse::{model::InsertPulse, schema::PulseEntity},
    platform::document::{QuerySnapshot, Subscription},
};

#[async_trait::async_trait]
pub trait PulseRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<PulseEntity>, error::SystemError>;

    /// Returns the new pulse id.
    async fn create(&self, pulse: &InsertPulse) -> Result<String, error::SystemError>;

    /// Pulses by `author_id` created at or after `since`, oldest first.
    async fn list_since(
        &self,
        author_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PulseEntity>, error::SystemError>;

    async fn delete(&self, id: &str) -> Result<(), error::SystemError>;

    async fn record_view(&self, id: &str, viewer_id: &str) -> Result<(), error::SystemError>;

    fn watch_views(&self, id: &str) -> Subscription<QuerySnapshot>;
}
