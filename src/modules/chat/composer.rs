//! The message being written: text, reply target and picked media.

use crate::{
    api::error,
    i18n::t,
    modules::{
        file_upload::MediaFile,
        message::{
            model::SendMessage,
            schema::{MediaKind, ReplyTo},
        },
    },
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub text: String,
    pub reply_to: Option<ReplyTo>,
    pub media: Option<(MediaFile, MediaKind)>,
}

impl Draft {
    pub fn to_message(&self) -> SendMessage {
        SendMessage {
            text: self.text.clone(),
            media: self.media.as_ref().map(|(file, _)| file.clone()),
            reply_to: self.reply_to.clone(),
            forwarded_post: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Composer {
    draft: Draft,
    uploading: bool,
    error: Option<error::Error>,
}

impl Composer {
    pub fn text(&self) -> &str {
        &self.draft.text
    }

    pub fn set_text(&mut self, text: &str) {
        self.draft.text = text.to_string();
    }

    pub fn reply_to(&self) -> Option<&ReplyTo> {
        self.draft.reply_to.as_ref()
    }

    pub fn set_reply_to(&mut self, reply_to: ReplyTo) {
        self.draft.reply_to = Some(reply_to);
    }

    pub fn clear_reply_to(&mut self) {
        self.draft.reply_to = None;
    }

    pub fn media(&self) -> Option<(&MediaFile, MediaKind)> {
        self.draft.media.as_ref().map(|(file, kind)| (file, *kind))
    }

    pub fn set_media(&mut self, file: MediaFile, kind: MediaKind) {
        self.error = None;
        self.draft.media = Some((file, kind));
    }

    /// Drops the picked file along with any error it produced.
    pub fn clear_media(&mut self) {
        self.draft.media = None;
        self.error = None;
    }

    pub fn error(&self) -> Option<&error::Error> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: error::Error) {
        self.error = Some(error);
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn set_uploading(&mut self, uploading: bool) {
        self.uploading = uploading;
    }

    pub fn media_picker_enabled(&self) -> bool {
        !self.uploading
    }

    pub fn can_send(&self) -> bool {
        !self.uploading && (!self.draft.text.trim().is_empty() || self.draft.media.is_some())
    }

    /// Empties the composer and hands back what it held.
    pub fn take(&mut self) -> Draft {
        self.error = None;
        std::mem::take(&mut self.draft)
    }

    /// Puts a draft back after a failed send.
    pub fn restore(&mut self, draft: Draft) {
        self.draft = draft;
    }

    /// Banner above the input while replying.
    pub fn reply_label(&self, me: &str) -> Option<String> {
        let reply_to = self.draft.reply_to.as_ref()?;
        if reply_to.sender_id == me {
            Some(t("messages.replyingToSelf", &[]))
        } else {
            Some(t("messages.replyingToOther", &[("username", reply_to.sender_username.as_str())]))
        }
    }
}
