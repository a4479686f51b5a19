use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::modules::user::schema::UserEntity;

fn trimmed_password(password: &str) -> Result<(), ValidationError> {
    if password.trim().chars().count() >= 6 {
        Ok(())
    } else {
        Err(ValidationError::new("password_length"))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignInModel {
    #[validate(contains(pattern = "@", message = "login.error"))]
    pub email: String,
    #[validate(custom(function = "trimmed_password", message = "login.error"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignUpModel {
    #[validate(contains(pattern = "@", message = "signup.genericError"))]
    pub email: String,
    #[validate(length(min = 3, max = 30, message = "editProfile.usernameLength"))]
    pub username: String,
    #[validate(custom(function = "trimmed_password", message = "signup.genericError"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileModel {
    #[validate(length(min = 3, max = 30, message = "editProfile.usernameLength"))]
    pub username: String,
    #[validate(length(max = 150, message = "editProfile.bioLength"))]
    pub bio: String,
    pub is_private: bool,
}

pub struct InsertUser {
    pub username: String,
    pub email: String,
    pub avatar: String,
}

pub struct UpdateUser {
    pub username: String,
    pub bio: String,
    pub is_private: bool,
    pub avatar: Option<String>,
}

/// Public view of a user, as shown in search results and headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub avatar: String,
    pub bio: String,
}

impl From<UserEntity> for UserResponse {
    fn from(user: UserEntity) -> Self {
        UserResponse { id: user.id, username: user.username, avatar: user.avatar, bio: user.bio }
    }
}
