/// App Session
///
/// Follows the signed-in user for the lifetime of the app:
/// - a welcome toast on each sign-in, and a one-time welcome animation per
///   installation
/// - a heartbeat that keeps `users/{uid}.lastSeen` fresh while signed in
/// - push registration and logging of foreground push messages
use std::future::poll_fn;

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    api::error,
    configs::LocalPrefs,
    constants::WELCOME_FLAG_KEY,
    i18n::t,
    modules::user::service::UserSvc,
    platform::{
        document::{poll_slot, SnapshotResult},
        messaging::{Permission, PushPayload},
        AuthUser, Platform, Subscription,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(AuthUser),
    SignedOut,
    Push(PushPayload),
}

enum Source {
    Auth(Option<AuthUser>),
    Push(SnapshotResult<PushPayload>),
    Closed,
}

pub struct AppSession {
    platform: Platform,
    users: UserSvc,
    prefs: LocalPrefs,
    auth: watch::Receiver<Option<AuthUser>>,
    user: Option<AuthUser>,
    heartbeat: Option<JoinHandle<()>>,
    push: Option<Subscription<PushPayload>>,
    toast: Option<String>,
}

impl AppSession {
    pub fn from_platform(platform: &Platform) -> Self {
        Self::new(platform, LocalPrefs::new(&platform.env.prefs_path))
    }

    pub fn new(platform: &Platform, prefs: LocalPrefs) -> Self {
        AppSession {
            users: UserSvc::from_platform(platform),
            auth: platform.auth.watch(),
            platform: platform.clone(),
            prefs,
            user: None,
            heartbeat: None,
            push: None,
            toast: None,
        }
    }

    /// Picks up a user who was already signed in when the session started.
    pub async fn start(&mut self) -> Option<SessionEvent> {
        let current = self.auth.borrow_and_update().clone();
        self.apply(current).await
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    /// Toast raised by the last sign-in, cleared once read.
    pub fn take_toast(&mut self) -> Option<String> {
        self.toast.take()
    }

    /// `true` the first time it is called on this installation.
    pub async fn take_welcome_animation(&self) -> Result<bool, error::SystemError> {
        if self.prefs.get::<bool>(WELCOME_FLAG_KEY).await?.unwrap_or(false) {
            return Ok(false);
        }
        self.prefs.set(WELCOME_FLAG_KEY, &true).await?;
        Ok(true)
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits for an auth change or a foreground push message.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let source = {
                let auth = &mut self.auth;
                let push = &mut self.push;
                tokio::select! {
                    changed = auth.changed() => match changed {
                        Ok(()) => Source::Auth(auth.borrow_and_update().clone()),
                        Err(_) => Source::Closed,
                    },
                    payload = poll_fn(|cx| poll_slot(push, cx)) => Source::Push(payload),
                }
            };

            match source {
                Source::Auth(user) => {
                    if let Some(event) = self.apply(user).await {
                        return Some(event);
                    }
                }
                Source::Push(Ok(payload)) => {
                    tracing::info!(title = ?payload.title, body = ?payload.body, "foreground push message");
                    return Some(SessionEvent::Push(payload));
                }
                Source::Push(Err(err)) => tracing::warn!(error = ?err, "push listener failed"),
                Source::Closed => return None,
            }
        }
    }

    async fn apply(&mut self, user: Option<AuthUser>) -> Option<SessionEvent> {
        let previous = self.user.as_ref().map(|u| u.uid.clone());
        match user {
            Some(user) if previous.as_deref() == Some(user.uid.as_str()) => {
                self.user = Some(user);
                None
            }
            Some(user) => {
                self.stop();
                if previous.is_none() {
                    self.toast = Some(t("app.welcomeToast", &[]));
                }
                tracing::info!(uid = %user.uid, "signed in");
                self.start_heartbeat(&user.uid);
                self.register_push(&user.uid).await;
                self.user = Some(user.clone());
                Some(SessionEvent::SignedIn(user))
            }
            None if previous.is_some() => {
                tracing::info!("signed out");
                self.stop();
                self.user = None;
                Some(SessionEvent::SignedOut)
            }
            None => None,
        }
    }

    fn start_heartbeat(&mut self, uid: &str) {
        let users = self.users.clone();
        let uid = uid.to_string();
        let every = self.platform.env.heartbeat_every();

        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(err) = users.touch_last_seen(&uid).await {
                    tracing::error!(uid = %uid, error = ?err, "failed to update last seen");
                }
            }
        }));
    }

    async fn register_push(&mut self, uid: &str) {
        let messaging = self.platform.messaging.clone();
        self.push = Some(messaging.on_message());

        if messaging.request_permission().await != Permission::Granted {
            tracing::info!("push permission not granted");
            return;
        }
        match messaging.get_token(&self.platform.env.vapid_key).await {
            Ok(Some(token)) => {
                if let Err(err) = self.users.register_push_token(uid, &token).await {
                    tracing::error!(uid = %uid, error = ?err, "failed to store push token");
                }
            }
            Ok(None) => tracing::info!("no push token available"),
            Err(err) => tracing::error!(error = ?err, "failed to fetch push token"),
        }
    }

    fn stop(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
        self.push = None;
    }
}

impl Drop for AppSession {
    fn drop(&mut self) {
        self.stop();
    }
}
