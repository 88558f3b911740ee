// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::{SqlitePool, types::Json as DbJson};
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{
        LoginRequest, RegisterRequest, USER_COLUMNS, UpdateProfileRequest, User, UserProfile,
        UserResponse,
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// Registers a new user with local credentials.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with a token and the user view (excluding credentials).
pub async fn register(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;

    let sql = format!(
        "INSERT INTO users (username, email, password, avatar, profile, created_at) \
         VALUES (?, ?, ?, '', ?, ?) \
         RETURNING {USER_COLUMNS}"
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(&payload.username)
        .bind(&payload.email)
        .bind(&hashed_password)
        .bind(DbJson(UserProfile::default()))
        .bind(chrono::Utc::now())
        .fetch_one(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                if e.to_string().contains("users.email") {
                    AppError::Conflict("Email already registered".to_string())
                } else {
                    AppError::Conflict(format!("Username '{}' already taken", payload.username))
                }
            } else {
                tracing::error!("Failed to register user: {:?}", e);
                AppError::from(e)
            }
        })?;

    let token = sign_jwt(user.id, &user.email, &config.jwt_secret, config.jwt_expiration)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "type": "Bearer",
            "user": UserResponse::from(user),
        })),
    ))
}

/// Authenticates a user by email and returns a JWT token.
///
/// A missing account, an OAuth-only account and a wrong password all map to
/// the same generic error so the response does not reveal which it was.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(&payload.email)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?
        .ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    let stored_hash = user
        .password
        .as_deref()
        .ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, stored_hash)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let token = sign_jwt(user.id, &user.email, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": UserResponse::from(user),
    })))
}

/// Get the current user.
pub async fn me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(claims.user_id())
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(user)))
}

/// Update the caller's username and/or profile fields.
///
/// Provided profile fields merge over the stored sub-record; a username
/// change re-checks uniqueness excluding the caller.
pub async fn update_profile(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user_id = claims.user_id();

    if let Some(username) = &payload.username {
        let taken = sqlx::query("SELECT id FROM users WHERE username = ? AND id != ?")
            .bind(username)
            .bind(user_id)
            .fetch_optional(&pool)
            .await?;
        if taken.is_some() {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }
    }

    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let profile = match payload.profile {
        Some(update) => user.profile.0.clone().merged_with(update),
        None => user.profile.0.clone(),
    };

    let sql = format!(
        "UPDATE users SET username = COALESCE(?, username), profile = ? WHERE id = ? \
         RETURNING {USER_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, User>(&sql)
        .bind(&payload.username)
        .bind(DbJson(profile))
        .bind(user_id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(UserResponse::from(updated)))
}
