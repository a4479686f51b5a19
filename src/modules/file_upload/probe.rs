//! Reads the duration of a video before it is accepted as an attachment.

use std::io::Cursor;

use symphonia::core::{
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{api::error, modules::file_upload::model::MediaFile};

pub trait DurationProbe: Send + Sync {
    fn duration_seconds(&self, file: &MediaFile) -> Result<f64, error::SystemError>;
}

/// Probes the container (mp4, mov, webm, mkv) and reports its longest track.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerDurationProbe;

impl DurationProbe for ContainerDurationProbe {
    fn duration_seconds(&self, file: &MediaFile) -> Result<f64, error::SystemError> {
        let mut hint = Hint::new();
        hint.mime_type(&file.content_type);
        if let Some((_, ext)) = file.name.rsplit_once('.') {
            hint.with_extension(ext);
        }

        let source = MediaSourceStream::new(
            Box::new(Cursor::new(file.bytes.clone())),
            MediaSourceStreamOptions::default(),
        );
        let probed = symphonia::default::get_probe()
            .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|err| {
                tracing::debug!(file = %file.name, error = %err, "container probe failed");
                error::SystemError::bad_request(format!("Unreadable video: {}", file.name))
            })?;

        probed
            .format
            .tracks()
            .iter()
            .filter_map(|track| {
                let params = &track.codec_params;
                let time = params.time_base?.calc_time(params.n_frames?);
                Some(time.seconds as f64 + time.frac)
            })
            .reduce(f64::max)
            .ok_or_else(|| error::SystemError::bad_request(format!("Video has no duration: {}", file.name)))
    }
}
