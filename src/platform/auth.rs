//! Auth collaborator: email/password accounts, the signed-in user and an
//! auth-state stream.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    api::error,
    utils::{hash_password, verify_password, Claims},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, error::SystemError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, error::SystemError>;

    /// Updates the signed-in user's display name and/or photo.
    async fn update_profile(
        &self,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Result<AuthUser, error::SystemError>;

    async fn sign_out(&self) -> Result<(), error::SystemError>;

    fn current_user(&self) -> Option<AuthUser>;

    fn id_token(&self) -> Option<String>;

    /// Auth-state stream; the current value is available immediately.
    fn watch(&self) -> watch::Receiver<Option<AuthUser>>;
}

struct Account {
    user: AuthUser,
    password_hash: String,
}

/// Accounts shared by every session of one in-memory backend.
#[derive(Clone, Default)]
pub struct AccountDirectory {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
}

impl AccountDirectory {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers an account with a caller-chosen uid.
    pub fn seed(
        &self,
        uid: &str,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<AuthUser, error::SystemError> {
        let email = email.trim().to_lowercase();
        let user = AuthUser {
            uid: uid.to_string(),
            email: email.clone(),
            display_name: display_name.map(str::to_string),
            photo_url: None,
        };
        let password_hash = hash_password(password)?;

        let mut accounts = self.lock();
        if accounts.contains_key(&email) {
            return Err(error::SystemError::conflict("auth/email-already-in-use"));
        }
        accounts.insert(email, Account { user: user.clone(), password_hash });
        Ok(user)
    }
}

/// One client session against an [`AccountDirectory`].
pub struct InMemoryAuth {
    directory: AccountDirectory,
    state: watch::Sender<Option<AuthUser>>,
    token: Mutex<Option<String>>,
    secret: String,
    session_expiration: u64,
}

impl InMemoryAuth {
    pub fn new(directory: AccountDirectory, secret: &str, session_expiration: u64) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            directory,
            state,
            token: Mutex::new(None),
            secret: secret.to_string(),
            session_expiration,
        }
    }

    fn start_session(&self, user: AuthUser) -> Result<AuthUser, error::SystemError> {
        let token = Claims::new(&user.uid, &user.email, self.session_expiration)
            .with_jti(Uuid::now_v7())
            .encode(self.secret.as_bytes())?;

        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = Some(token);
        self.state.send_replace(Some(user.clone()));
        tracing::info!(uid = %user.uid, "signed in");
        Ok(user)
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, error::SystemError> {
        let email = email.trim().to_lowercase();
        let (user, hash) = {
            let accounts = self.directory.lock();
            let account = accounts
                .get(&email)
                .ok_or_else(|| error::SystemError::unauthorized("auth/invalid-credential"))?;
            (account.user.clone(), account.password_hash.clone())
        };

        if !verify_password(&hash, password)? {
            return Err(error::SystemError::unauthorized("auth/invalid-credential"));
        }

        self.start_session(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, error::SystemError> {
        if password.len() < 6 {
            return Err(error::SystemError::bad_request("auth/weak-password"));
        }
        let uid = Uuid::now_v7().simple().to_string();
        let user = self.directory.seed(&uid, email, password, None)?;
        self.start_session(user)
    }

    async fn update_profile(
        &self,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Result<AuthUser, error::SystemError> {
        let current =
            self.current_user().ok_or_else(|| error::SystemError::unauthorized("auth/no-current-user"))?;

        let updated = {
            let mut accounts = self.directory.lock();
            let account = accounts
                .get_mut(&current.email)
                .ok_or_else(|| error::SystemError::not_found("auth/user-not-found"))?;
            if display_name.is_some() {
                account.user.display_name = display_name;
            }
            if photo_url.is_some() {
                account.user.photo_url = photo_url;
            }
            account.user.clone()
        };

        self.state.send_replace(Some(updated.clone()));
        Ok(updated)
    }

    async fn sign_out(&self) -> Result<(), error::SystemError> {
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = None;
        if let Some(user) = self.state.send_replace(None) {
            tracing::info!(uid = %user.uid, "signed out");
        }
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    fn id_token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}
