use std::path::Path;

use crate::{constants::MAX_VIDEO_SECONDS, modules::message::schema::MediaKind};

/// A file picked by the user, held in memory until upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    /// Content type is guessed from the file extension.
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        let content_type = mime_guess::from_path(name).first_or_octet_stream();
        Self::with_content_type(name, content_type.essence_str(), bytes)
    }

    pub fn with_content_type(name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        let name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();
        Self { name, content_type: content_type.to_string(), bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Image or video; anything else cannot be attached.
    pub fn kind(&self) -> Option<MediaKind> {
        if self.content_type.starts_with("image/") {
            Some(MediaKind::Image)
        } else if self.content_type.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub max_video_seconds: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024, // 50MB
            max_video_seconds: MAX_VIDEO_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub key: String,
    pub url: String,
    pub kind: MediaKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_guessed_mime() {
        assert_eq!(MediaFile::new("praia.JPG", vec![]).kind(), Some(MediaKind::Image));
        assert_eq!(MediaFile::new("clip.mp4", vec![]).kind(), Some(MediaKind::Video));
        assert_eq!(MediaFile::new("notes.pdf", vec![]).kind(), None);
        assert_eq!(MediaFile::new("no-extension", vec![]).content_type, "application/octet-stream");
    }

    #[test]
    fn directory_components_are_dropped() {
        assert_eq!(MediaFile::new("../../etc/foto.png", vec![]).name, "foto.png");
    }
}
