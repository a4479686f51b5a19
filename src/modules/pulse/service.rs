/// Pulse Service
///
/// Short-lived photo or video posts. A pulse is visible for 24 hours after
/// it is created; every viewer other than the author leaves one view record.
use std::sync::Arc;

use chrono::Duration;

use crate::{
    api::error,
    modules::{
        file_upload::{MediaFile, MediaService},
        message::schema::MediaKind,
        pulse::{
            model::InsertPulse,
            repository::PulseRepository,
            repository_doc::PulseDocRepository,
            schema::{PulseEntity, PULSE_LIFETIME_HOURS},
        },
    },
    platform::{
        document::{QuerySnapshot, Subscription},
        Clock, Platform,
    },
};

#[derive(Clone)]
pub struct PulseService<R>
where
    R: PulseRepository + Send + Sync,
{
    repo: Arc<R>,
    media: MediaService,
    clock: Arc<dyn Clock>,
}

pub type PulseSvc = PulseService<PulseDocRepository>;

impl PulseSvc {
    pub fn from_platform(platform: &Platform) -> Self {
        Self::with_dependencies(
            Arc::new(PulseDocRepository::new(platform.db.clone())),
            MediaService::with_defaults(platform),
            platform.clock.clone(),
        )
    }
}

impl<R> PulseService<R>
where
    R: PulseRepository + Send + Sync,
{
    pub fn with_dependencies(repo: Arc<R>, media: MediaService, clock: Arc<dyn Clock>) -> Self {
        PulseService { repo, media, clock }
    }

    /// Uploads the media under the author's folder and publishes the pulse.
    /// Returns the new pulse id.
    pub async fn create(
        &self,
        author_id: &str,
        file: &MediaFile,
        caption: &str,
    ) -> Result<String, error::Error> {
        if !matches!(file.kind(), Some(MediaKind::Image | MediaKind::Video)) {
            return Err(error::Error::validation("createPulse.invalidFileError"));
        }

        let uploaded = self
            .media
            .upload(&format!("pulses/{author_id}"), file)
            .await
            .map_err(|err| err.into_write("createPulse.publishError"))?;
        let id = self
            .repo
            .create(&InsertPulse {
                author_id: author_id.to_string(),
                media_url: uploaded.url,
                caption: caption.trim().to_string(),
            })
            .await
            .map_err(|err| err.into_write("createPulse.publishError"))?;

        tracing::info!(pulse = %id, author = %author_id, "pulse published");
        Ok(id)
    }

    /// The author's pulses from the last 24 hours, oldest first.
    pub async fn list_active(&self, author_id: &str) -> Result<Vec<PulseEntity>, error::SystemError> {
        let since = self.clock.now() - Duration::hours(PULSE_LIFETIME_HOURS);
        self.repo.list_since(author_id, since).await
    }

    /// Records that `viewer_id` saw the pulse. The author's own views are not
    /// recorded and a failed write is only logged. Returns whether a view was
    /// written.
    pub async fn record_view(&self, pulse: &PulseEntity, viewer_id: &str) -> bool {
        if pulse.author_id == viewer_id {
            return false;
        }
        match self.repo.record_view(&pulse.id, viewer_id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(pulse = %pulse.id, viewer = %viewer_id, error = ?err, "could not record pulse view");
                false
            }
        }
    }

    pub fn watch_views(&self, pulse_id: &str) -> Subscription<QuerySnapshot> {
        self.repo.watch_views(pulse_id)
    }

    pub async fn delete(&self, pulse: &PulseEntity, me: &str) -> Result<(), error::Error> {
        if pulse.author_id != me {
            return Err(error::SystemError::forbidden("Only the author can delete a pulse")
                .into_write("pulseViewer.deleteError"));
        }
        self.repo
            .delete(&pulse.id)
            .await
            .map_err(|err| err.into_write("pulseViewer.deleteError"))?;
        tracing::info!(pulse = %pulse.id, "pulse deleted");
        Ok(())
    }
}
