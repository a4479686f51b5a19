/// User Service
///
/// Account lifecycle on top of the auth provider plus the `users/{uid}`
/// profile document: sign-up, sign-in, profile edits, heartbeat, push token
/// and username search.
use log::info;
use std::sync::Arc;

use crate::{
    api::error,
    constants::DEFAULT_AVATAR_BASE,
    modules::{
        file_upload::{MediaFile, MediaService},
        message::schema::MediaKind,
        user::{
            model::{InsertUser, SignInModel, SignUpModel, UpdateProfileModel, UpdateUser, UserResponse},
            repository::UserRepository,
            repository_doc::UserDocRepository,
            schema::UserEntity,
        },
    },
    platform::{AuthUser, Platform},
    utils::validated,
};

const SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
pub struct UserService<R>
where
    R: UserRepository + Send + Sync,
{
    repo: Arc<R>,
    platform: Platform,
    media: MediaService,
}

pub type UserSvc = UserService<UserDocRepository>;

impl UserSvc {
    pub fn from_platform(platform: &Platform) -> Self {
        Self::with_dependencies(
            Arc::new(UserDocRepository::new(platform.db.clone())),
            platform.clone(),
            MediaService::with_defaults(platform),
        )
    }
}

impl<R> UserService<R>
where
    R: UserRepository + Send + Sync,
{
    pub fn with_dependencies(repo: Arc<R>, platform: Platform, media: MediaService) -> Self {
        info!("UserService initialized with dependencies");
        UserService { repo, platform, media }
    }

    pub async fn sign_in(&self, form: SignInModel) -> Result<AuthUser, error::Error> {
        let form = validated(form)?;
        self.platform
            .auth
            .sign_in(form.email.trim(), form.password.trim())
            .await
            .map_err(|err| err.into_auth("login.error"))
    }

    /// Creates the auth account, names it, and writes the profile document.
    pub async fn sign_up(&self, form: SignUpModel) -> Result<AuthUser, error::Error> {
        let form = validated(form)?;
        let signup_error = |err: error::SystemError| match err {
            error::SystemError::Conflict(_) => err.into_auth("signup.emailInUseError"),
            other => other.into_write("signup.genericError"),
        };

        let account = self
            .platform
            .auth
            .sign_up(form.email.trim(), form.password.trim())
            .await
            .map_err(signup_error)?;

        let avatar = format!("{DEFAULT_AVATAR_BASE}{}", account.uid);
        let account = self
            .platform
            .auth
            .update_profile(Some(form.username.clone()), Some(avatar.clone()))
            .await
            .map_err(signup_error)?;

        self.repo
            .create(&account.uid, &InsertUser { username: form.username, email: account.email.clone(), avatar })
            .await
            .map_err(signup_error)?;

        info!("User {} signed up", account.uid);
        Ok(account)
    }

    pub async fn sign_out(&self) -> Result<(), error::Error> {
        self.platform.auth.sign_out().await.map_err(error::Error::from)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserEntity>, error::SystemError> {
        self.repo.find_by_id(id).await
    }

    /// Saves the edit-profile form; an avatar, when given, is uploaded first.
    pub async fn update_profile(
        &self,
        form: UpdateProfileModel,
        avatar: Option<MediaFile>,
    ) -> Result<UserEntity, error::Error> {
        let form = validated(form)?;
        let uid = self.platform.current_uid().ok_or_else(|| error::Error::auth("login.error"))?;

        let avatar_url = match avatar {
            Some(file) if file.kind() != Some(MediaKind::Image) => {
                return Err(error::Error::validation("createPulse.invalidFileError"));
            }
            Some(file) => Some(
                self.media
                    .upload(&format!("avatars/{uid}"), &file)
                    .await
                    .map_err(|err| err.into_write("editProfile.updateError"))?
                    .url,
            ),
            None => None,
        };

        let update = UpdateUser {
            username: form.username.clone(),
            bio: form.bio,
            is_private: form.is_private,
            avatar: avatar_url.clone(),
        };
        self.repo
            .update(&uid, &update)
            .await
            .map_err(|err| err.into_write("editProfile.updateError"))?;

        self.platform
            .auth
            .update_profile(Some(form.username), avatar_url)
            .await
            .map_err(|err| err.into_write("editProfile.updateError"))?;

        self.repo
            .find_by_id(&uid)
            .await
            .map_err(|err| err.into_read("editProfile.updateError"))?
            .ok_or_else(|| error::Error::read("editProfile.updateError"))
    }

    pub async fn touch_last_seen(&self, uid: &str) -> Result<(), error::SystemError> {
        self.repo.touch_last_seen(uid).await
    }

    pub async fn register_push_token(&self, uid: &str, token: &str) -> Result<(), error::SystemError> {
        self.repo.set_push_token(uid, token).await
    }

    /// Username-prefix search for starting a conversation; never returns `me`.
    pub async fn search_users(
        &self,
        prefix: &str,
        me: &str,
    ) -> Result<Vec<UserResponse>, error::SystemError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(vec![]);
        }

        let users = self.repo.search_by_username_prefix(prefix, SEARCH_LIMIT + 1).await?;
        Ok(users
            .into_iter()
            .filter(|user| user.id != me)
            .take(SEARCH_LIMIT)
            .map(UserResponse::from)
            .collect())
    }
}
