use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Request body for user registration.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    /// Account handle, 1-32 letters, digits, or underscores.
    #[schema(example = "mira_k")]
    pub username: String,
    /// Password, 8 to 128 characters.
    #[schema(example = "orchid-harbor-22")]
    pub password: String,
    /// Optional display name, up to 64 characters.
    #[schema(example = "Mira")]
    pub nickname: Option<String>,
}

pub fn validate_register_request(payload: &RegisterRequest) -> Result<(), AppError> {
    let username = payload.username.trim();
    if !(1..=32).contains(&username.chars().count()) {
        return Err(AppError::Validation(
            "Username must be between 1 and 32 characters".into(),
        ));
    }
    if username.chars().any(|c| !c.is_ascii_alphanumeric() && c != '_') {
        return Err(AppError::Validation(
            "Username may only use letters, digits, and underscores".into(),
        ));
    }
    if !(8..=128).contains(&payload.password.len()) {
        return Err(AppError::Validation(
            "Password must be between 8 and 128 characters".into(),
        ));
    }
    if let Some(nickname) = &payload.nickname
        && nickname.chars().count() > 64
    {
        return Err(AppError::Validation(
            "Nickname is limited to 64 characters".into(),
        ));
    }
    Ok(())
}

/// Request body for user login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// Account handle.
    #[schema(example = "mira_k")]
    pub username: String,
    /// Account password.
    #[schema(example = "orchid-harbor-22")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::Validation("Username is required".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password is required".into()));
    }
    Ok(())
}

/// Successful registration response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    /// ID of the new account.
    #[schema(example = 17)]
    pub id: i32,
    /// Handle the account was registered under.
    #[schema(example = "mira_k")]
    pub username: String,
}

impl From<crate::entity::user::Model> for RegisterResponse {
    fn from(user: crate::entity::user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token valid for 7 days.
    #[schema(example = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOjE3fQ...")]
    pub token: String,
    /// Handle of the logged-in account.
    #[schema(example = "mira_k")]
    pub username: String,
}

/// Current authenticated user's profile.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    /// User ID.
    #[schema(example = 17)]
    pub id: i32,
    /// Account handle.
    #[schema(example = "mira_k")]
    pub username: String,
    /// Display name.
    #[schema(example = "Mira")]
    pub nickname: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
}

impl From<crate::entity::user::Model> for MeResponse {
    fn from(user: crate::entity::user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            nickname: user.nickname,
            avatar: user.avatar,
        }
    }
}
