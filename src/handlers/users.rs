// src/handlers/users.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::user::{USER_COLUMNS, User, UserResponse, UserStats},
    utils::jwt::Claims,
};

/// Get a user's public profile by ID. Credentials are stripped by the
/// response type, not by the query.
pub async fn get_profile(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(user)))
}

/// Posting statistics for the current user, aggregated in a single query.
pub async fn stats(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let stats = sqlx::query_as::<_, UserStats>(
        r#"
        SELECT
            COUNT(*) AS total_posts,
            COALESCE(SUM(CASE WHEN type = 'lost' THEN 1 ELSE 0 END), 0) AS lost_items,
            COALESCE(SUM(CASE WHEN type = 'found' THEN 1 ELSE 0 END), 0) AS found_items,
            COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active_posts,
            COALESCE(SUM(CASE WHEN status = 'claimed' THEN 1 ELSE 0 END), 0) AS claimed_items,
            COALESCE(SUM(CASE WHEN status = 'returned' THEN 1 ELSE 0 END), 0) AS returned_items
        FROM items
        WHERE user_id = ?
        "#,
    )
    .bind(claims.user_id())
    .fetch_one(&pool)
    .await?;

    Ok(Json(stats))
}
