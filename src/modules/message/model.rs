use crate::modules::{
    file_upload::MediaFile,
    message::schema::{ForwardedPost, MediaKind, ReplyTo},
};

/// Who is sending, as copied into the recipient's notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub uid: String,
    pub username: String,
    pub avatar: String,
}

/// A message as composed, before media is uploaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendMessage {
    pub text: String,
    pub media: Option<MediaFile>,
    pub reply_to: Option<ReplyTo>,
    pub forwarded_post: Option<ForwardedPost>,
}

impl SendMessage {
    pub fn text(text: &str) -> Self {
        SendMessage { text: text.to_string(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.media.is_none() && self.forwarded_post.is_none()
    }
}

pub struct InsertMessage {
    pub sender_id: String,
    pub text: String,
    pub reply_to: Option<ReplyTo>,
    pub media_url: Option<String>,
    pub media_type: Option<MediaKind>,
    pub forwarded_post_data: Option<ForwardedPost>,
}
