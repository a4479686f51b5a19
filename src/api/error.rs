use std::borrow::Cow;

use crate::i18n;

/// Errors surfaced to a view. The payload is a translation key, rendered with
/// [`Error::localized`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Validation: {0}")]
    Validation(Cow<'static, str>),
    #[error("Auth: {0}")]
    Auth(Cow<'static, str>),
    #[error("Write: {0}")]
    Write(Cow<'static, str>),
    #[error("Read: {0}")]
    Read(Cow<'static, str>),
    #[error("Internal Error")]
    Internal,
}

impl Error {
    pub fn validation(key: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation(key.into())
    }

    pub fn auth(key: impl Into<Cow<'static, str>>) -> Self {
        Self::Auth(key.into())
    }

    pub fn write(key: impl Into<Cow<'static, str>>) -> Self {
        Self::Write(key.into())
    }

    pub fn read(key: impl Into<Cow<'static, str>>) -> Self {
        Self::Read(key.into())
    }

    pub fn key(&self) -> &str {
        match self {
            Error::Validation(key) | Error::Auth(key) | Error::Write(key) | Error::Read(key) => {
                key.as_ref()
            }
            Error::Internal => "common.error",
        }
    }

    /// Text shown inline next to the form or composer that triggered the error.
    pub fn localized(&self) -> String {
        i18n::t(self.key(), &[])
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    // jwt errors
    #[error("JWT Error")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    // argon2 errors
    #[error("Hash Error")]
    HashError(#[from] argon2::password_hash::Error),
    // serde errors
    #[error("JSON Serialization/Deserialization Error")]
    JsonError(#[from] serde_json::Error),
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    // Platform rejections
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Unauthorized: {0}")]
    Unauthorized(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Conflict: {0}")]
    Conflict(Cow<'static, str>),
    #[error("Unavailable: {0}")]
    Unavailable(Cow<'static, str>),
    #[error("Internal System Error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl SystemError {
    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Maps a failed write or upload to the view error carrying `key`.
    pub fn into_write(self, key: &'static str) -> Error {
        log::error!("Write failed: {:?}", self);
        Error::write(key)
    }

    pub fn into_auth(self, key: &'static str) -> Error {
        log::warn!("Auth rejected: {:?}", self);
        Error::auth(key)
    }

    /// Maps a failed read or subscription to the view error carrying `key`.
    pub fn into_read(self, key: &'static str) -> Error {
        log::error!("Read failed: {:?}", self);
        Error::read(key)
    }
}

impl From<SystemError> for Error {
    fn from(value: SystemError) -> Self {
        match value {
            SystemError::BadRequest(msg) => Error::Validation(msg),
            SystemError::Unauthorized(msg) | SystemError::Forbidden(msg) => Error::Auth(msg),
            SystemError::NotFound(msg) => Error::Read(msg),
            SystemError::Conflict(msg) | SystemError::Unavailable(msg) => Error::Write(msg),
            _ => {
                log::error!("Internal Error: {:?}", value);
                Error::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let key = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.clone())
            .unwrap_or_else(|| "common.invalidForm".into());
        Error::Validation(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_errors_map_to_view_categories() {
        assert_eq!(
            Error::from(SystemError::bad_request("login.error")),
            Error::validation("login.error")
        );
        assert_eq!(Error::from(SystemError::unauthorized("login.error")), Error::auth("login.error"));
        assert_eq!(
            Error::from(SystemError::unavailable("messages.media.uploadError")),
            Error::write("messages.media.uploadError")
        );
        let io = std::io::Error::other("disk");
        assert_eq!(Error::from(SystemError::from(io)), Error::Internal);
    }

    #[test]
    fn localized_uses_translation_table() {
        assert_eq!(
            Error::write("messages.media.uploadError").localized(),
            "Falha ao enviar mídia."
        );
        assert_eq!(Error::validation("no.such.key").localized(), "no.such.key");
    }
}
