/// Media Service
///
/// Validation and upload of user-picked files: chat attachments, avatars and
/// pulses. Object keys are `{prefix}/{millis}-{filename}`.
use std::sync::Arc;

use crate::{
    api::error,
    modules::{
        file_upload::{
            model::{MediaFile, UploadConfig, UploadedMedia},
            probe::{ContainerDurationProbe, DurationProbe},
        },
        message::schema::MediaKind,
    },
    platform::{BlobStore, Clock, Platform},
};

#[derive(Clone)]
pub struct MediaService {
    storage: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn DurationProbe>,
    config: UploadConfig,
}

impl MediaService {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn DurationProbe>,
        config: UploadConfig,
    ) -> Self {
        Self { storage, clock, probe, config }
    }

    pub fn with_defaults(platform: &Platform) -> Self {
        Self::new(
            platform.storage.clone(),
            platform.clock.clone(),
            Arc::new(ContainerDurationProbe),
            UploadConfig::default(),
        )
    }

    pub fn with_probe(mut self, probe: Arc<dyn DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Checks a chat attachment before it is previewed. Images pass; videos
    /// must probe to at most the configured duration.
    pub fn validate_attachment(&self, file: &MediaFile) -> Result<MediaKind, error::Error> {
        if file.size() > self.config.max_file_size {
            return Err(error::Error::validation("messages.media.tooLarge"));
        }

        match file.kind() {
            Some(MediaKind::Image) => Ok(MediaKind::Image),
            Some(MediaKind::Video) => {
                let seconds = self.probe.duration_seconds(file).map_err(|err| {
                    tracing::warn!(file = %file.name, error = ?err, "video probe failed");
                    error::Error::validation("messages.media.probeFailed")
                })?;
                if seconds > self.config.max_video_seconds {
                    return Err(error::Error::validation("messages.media.videoTooLong"));
                }
                Ok(MediaKind::Video)
            }
            _ => Err(error::Error::validation("messages.media.unsupported")),
        }
    }

    pub fn object_key(&self, prefix: &str, file: &MediaFile) -> String {
        format!("{}/{}-{}", prefix, self.clock.now().timestamp_millis(), file.name)
    }

    pub async fn upload(
        &self,
        prefix: &str,
        file: &MediaFile,
    ) -> Result<UploadedMedia, error::SystemError> {
        let kind = file.kind().ok_or_else(|| {
            error::SystemError::bad_request(format!("File type '{}' is not allowed", file.content_type))
        })?;

        let key = self.object_key(prefix, file);
        self.storage.upload(&key, file.bytes.clone(), &file.content_type).await?;
        let url = self.storage.download_url(&key).await?;

        tracing::info!(key = %key, size = file.size(), "media uploaded");
        Ok(UploadedMedia { key, url, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::file_upload::probe::tests::mp4;
    use crate::platform::{clock::ManualClock, storage::InMemoryBlobStore};
    use chrono::{TimeZone, Utc};

    fn service() -> (MediaService, Arc<InMemoryBlobStore>) {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()));
        let storage = Arc::new(InMemoryBlobStore::new("http://blobs", "bucket", clock.clone()));
        let service =
            MediaService::new(storage.clone(), clock, Arc::new(ContainerDurationProbe), UploadConfig::default());
        (service, storage)
    }

    #[test]
    fn video_duration_boundary_is_inclusive() {
        let (service, _) = service();
        let exactly = MediaFile::new("a.mp4", mp4(1000, 30_000));
        assert_eq!(service.validate_attachment(&exactly), Ok(MediaKind::Video));

        let longer = MediaFile::new("b.mp4", mp4(1000, 30_001));
        assert_eq!(
            service.validate_attachment(&longer),
            Err(error::Error::validation("messages.media.videoTooLong"))
        );
    }

    #[test]
    fn unsupported_and_unreadable_files_are_rejected() {
        let (service, _) = service();
        let pdf = MediaFile::new("doc.pdf", vec![1]);
        assert_eq!(service.validate_attachment(&pdf).unwrap_err().key(), "messages.media.unsupported");

        let broken = MediaFile::new("clip.mp4", vec![0; 12]);
        assert_eq!(service.validate_attachment(&broken).unwrap_err().key(), "messages.media.probeFailed");

        assert!(service.validate_attachment(&MediaFile::new("a.png", vec![1, 2])).is_ok());
    }

    struct FixedProbe(f64);

    impl DurationProbe for FixedProbe {
        fn duration_seconds(&self, _file: &MediaFile) -> Result<f64, error::SystemError> {
            Ok(self.0)
        }
    }

    #[test]
    fn custom_probe_decides_video_length() {
        let (service, _) = service();
        let webm = MediaFile::with_content_type("clip.webm", "video/webm", vec![0; 8]);
        assert!(service.clone().with_probe(Arc::new(FixedProbe(12.5))).validate_attachment(&webm).is_ok());
        assert_eq!(
            service.with_probe(Arc::new(FixedProbe(30.5))).validate_attachment(&webm).unwrap_err().key(),
            "messages.media.videoTooLong"
        );
    }

    #[tokio::test]
    async fn upload_uses_prefixed_timestamped_key() {
        let (service, storage) = service();
        let file = MediaFile::new("foto.png", vec![9; 4]);
        let uploaded = service.upload("chat_media/u1_u2", &file).await.unwrap();

        assert_eq!(uploaded.key, "chat_media/u1_u2/1700000000000-foto.png");
        assert_eq!(uploaded.kind, MediaKind::Image);
        assert!(uploaded.url.starts_with("http://blobs/bucket/o/chat_media%2Fu1_u2%2F"));
        assert_eq!(storage.metadata(&uploaded.key).unwrap().content_type, "image/png");
    }
}
