use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::api::error;

/// A peer counts as online while its `lastSeen` heartbeat is younger than this.
pub const PRESENCE_WINDOW_SECS: i64 = 600;
/// Longest video accepted as a chat attachment.
pub const MAX_VIDEO_SECONDS: f64 = 30.0;
pub const WELCOME_FLAG_KEY: &str = "hasSeenWelcome_VibeMP";
pub const DEFAULT_AVATAR_BASE: &str = "https://i.pravatar.cc/150?u=";

#[derive(Debug, Clone)]
pub struct Env {
    pub project_id: String,
    pub storage_bucket: String,
    pub storage_base_url: String,
    pub auth_secret: String,
    pub session_expiration: u64,
    pub vapid_key: String,
    pub prefs_path: String,
    pub utc_offset_minutes: i32,
    pub heartbeat_interval: u64,
}

impl Env {
    /// Reads the configuration from the process environment, after `.env` has
    /// been loaded by the caller.
    pub fn from_env() -> Result<Self, error::SystemError> {
        let defaults = Env::default();

        let project_id = std::env::var("PROJECT_ID").unwrap_or(defaults.project_id);
        let storage_bucket = std::env::var("STORAGE_BUCKET")
            .unwrap_or_else(|_| format!("{project_id}.appspot.com"));
        let storage_base_url =
            std::env::var("STORAGE_BASE_URL").unwrap_or(defaults.storage_base_url);
        let auth_secret = std::env::var("AUTH_SECRET").unwrap_or(defaults.auth_secret);
        let session_expiration = parse_var("SESSION_EXPIRATION", defaults.session_expiration)?;
        let vapid_key = std::env::var("VAPID_KEY").unwrap_or(defaults.vapid_key);
        let prefs_path = std::env::var("PREFS_PATH").unwrap_or(defaults.prefs_path);
        let utc_offset_minutes = parse_var("UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?;
        let heartbeat_interval = parse_var("HEARTBEAT_INTERVAL", defaults.heartbeat_interval)?;

        Ok(Env {
            project_id,
            storage_bucket,
            storage_base_url,
            auth_secret,
            session_expiration,
            vapid_key,
            prefs_path,
            utc_offset_minutes,
            heartbeat_interval,
        })
    }

    /// Offset used to decide which calendar day an interaction fell on.
    pub fn local_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn heartbeat_every(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval.max(1))
    }
}

impl Default for Env {
    fn default() -> Self {
        let project_id = "vibemp-local".to_string();
        Env {
            storage_bucket: format!("{project_id}.appspot.com"),
            project_id,
            storage_base_url: "http://localhost:9199/v0/b".to_string(),
            auth_secret: "local-development-secret".to_string(),
            session_expiration: 3600,
            vapid_key: String::new(),
            prefs_path: ".vibemp-prefs.json".to_string(),
            utc_offset_minutes: chrono::Local::now().offset().local_minus_utc() / 60,
            heartbeat_interval: 5 * 60,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, error::SystemError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| error::SystemError::bad_request(format!("{name} has an invalid value"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_offset_falls_back_to_utc_when_out_of_range() {
        let env = Env { utc_offset_minutes: -180, ..Env::default() };
        assert_eq!(env.local_offset().local_minus_utc(), -3 * 3600);

        for minutes in [i32::MAX, i32::MIN, 24 * 60] {
            let env = Env { utc_offset_minutes: minutes, ..Env::default() };
            assert_eq!(env.local_offset().local_minus_utc(), 0);
        }
    }

    #[test]
    fn heartbeat_interval_is_at_least_a_second() {
        let env = Env { heartbeat_interval: 0, ..Env::default() };
        assert_eq!(env.heartbeat_every(), Duration::from_secs(1));
    }
}
