use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use sea_orm::ActiveModelTrait;
use tracing::instrument;

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::auth::{
    LoginRequest, LoginResponse, MeResponse, RegisterRequest, RegisterResponse,
    validate_login_request, validate_register_request,
};
use crate::state::AppState;
use crate::utils::{hash, jwt};

/// Register a new account.
#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "register",
    summary = "Register a new account",
    description = "Creates a user with the given username and password.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Invalid input (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Username already exists (USERNAME_TAKEN)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_register_request(&payload)?;

    let username = payload.username.trim().to_string();
    let nickname = payload
        .nickname
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    let password_hash = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    let new_user = user::ActiveModel {
        username: Set(username),
        password: Set(password_hash),
        nickname: Set(nickname),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let user = new_user
        .insert(&state.db)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                tracing::debug!("Registration race: unique constraint caught on insert");
                AppError::UsernameTaken
            }
            _ => AppError::from(e),
        })?;

    Ok((StatusCode::CREATED, Json(RegisterResponse::from(user))))
}

/// Exchange credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in",
    description = "Verifies the password and returns a JWT valid for 7 days.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Invalid input (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Bad username or password (INVALID_CREDENTIALS)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login_request(&payload)?;

    let username = payload.username.trim();

    let user = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !hash::verify_password(&payload.password, &user.password) {
        return Err(AppError::InvalidCredentials);
    }

    let token = jwt::sign(&state.config.auth.jwt_secret, user.id, &user.username)
        .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    Ok(Json(LoginResponse {
        token,
        username: user.username,
    }))
}

/// Return the current user's profile.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current user profile",
    responses(
        (status = 200, description = "Profile of the token's owner", body = MeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, AppError> {
    let user = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(MeResponse::from(user)))
}
