//! Shared fixtures: one local backend on a manual clock, with `u1` (ana) and
//! `u2` (bia) signed in on separate sessions.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::{
    configs::{connect_platform, LocalBackend},
    constants::{Env, DEFAULT_AVATAR_BASE},
    modules::{
        conversation::model::ParticipantSeed,
        file_upload::MediaService,
        message::{model::Sender, service::MessageSvc},
        user::{
            model::InsertUser, repository::UserRepository, repository_doc::UserDocRepository,
            service::UserSvc,
        },
    },
    platform::{clock::ManualClock, Platform},
};

pub const PASSWORD: &str = "secret123";

pub struct Fixture {
    pub backend: LocalBackend,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let env = Env { utc_offset_minutes: -180, ..Env::default() };
        Fixture { backend: connect_platform(env, clock.clone()), clock }
    }

    /// Registers an account and writes its profile document.
    pub async fn add_user(&self, uid: &str, username: &str) {
        let email = format!("{username}@vibemp.dev");
        self.backend.directory.seed(uid, &email, PASSWORD, Some(username)).unwrap();
        UserDocRepository::new(self.backend.db.clone())
            .create(
                uid,
                &InsertUser {
                    username: username.to_string(),
                    email,
                    avatar: format!("{DEFAULT_AVATAR_BASE}{uid}"),
                },
            )
            .await
            .unwrap();
    }

    pub async fn signed_in(&self, username: &str) -> Platform {
        let platform = self.backend.session();
        platform.auth.sign_in(&format!("{username}@vibemp.dev"), PASSWORD).await.unwrap();
        platform
    }
}

pub async fn platform_pair() -> (Fixture, Platform, Platform) {
    let fixture = Fixture::new();
    fixture.add_user("u1", "ana").await;
    fixture.add_user("u2", "bia").await;
    let a = fixture.signed_in("ana").await;
    let b = fixture.signed_in("bia").await;
    (fixture, a, b)
}

pub fn user_service(platform: &Platform) -> UserSvc {
    UserSvc::from_platform(platform)
}

pub fn message_service(platform: &Platform) -> MessageSvc {
    MessageSvc::from_platform(platform, MediaService::with_defaults(platform))
}

async fn profile(platform: &Platform) -> (String, String, String) {
    let uid = platform.current_uid().unwrap();
    let user = UserDocRepository::new(platform.db.clone()).find_by_id(&uid).await.unwrap().unwrap();
    (uid, user.username, user.avatar)
}

pub async fn seed_of(platform: &Platform) -> ParticipantSeed {
    let (uid, username, avatar) = profile(platform).await;
    ParticipantSeed { uid, username, avatar }
}

pub async fn sender_of(platform: &Platform) -> Sender {
    let (uid, username, avatar) = profile(platform).await;
    Sender { uid, username, avatar }
}
