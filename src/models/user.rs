// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use validator::Validate;

/// Column list shared by every user query.
pub const USER_COLUMNS: &str =
    "id, username, email, password, oauth_subject, avatar, is_verified, profile, created_at";

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Unique account email.
    pub email: String,

    /// Argon2 password hash; NULL for accounts created through an external
    /// identity provider. Skipped during serialization to prevent leaking
    /// sensitive data.
    #[serde(skip)]
    pub password: Option<String>,

    /// External identity subject (e.g. an OAuth `sub` claim); NULL for
    /// local-credential accounts.
    #[serde(skip)]
    pub oauth_subject: Option<String>,

    pub avatar: String,

    pub is_verified: bool,

    pub profile: Json<UserProfile>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Profile sub-record, stored as a JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UserProfile {
    #[validate(length(max = 100))]
    pub first_name: Option<String>,

    #[validate(length(max = 100))]
    pub last_name: Option<String>,

    #[validate(length(max = 30))]
    pub phone: Option<String>,

    #[validate(length(max = 200))]
    pub address: Option<String>,

    #[validate(length(max = 100))]
    pub college: Option<String>,

    #[validate(length(max = 100))]
    pub department: Option<String>,
}

impl UserProfile {
    /// Merge provided fields over the stored ones, leaving the rest intact.
    pub fn merged_with(mut self, update: UserProfile) -> Self {
        if update.first_name.is_some() {
            self.first_name = update.first_name;
        }
        if update.last_name.is_some() {
            self.last_name = update.last_name;
        }
        if update.phone.is_some() {
            self.phone = update.phone;
        }
        if update.address.is_some() {
            self.address = update.address;
        }
        if update.college.is_some() {
            self.college = update.college;
        }
        if update.department.is_some() {
            self.department = update.department;
        }
        self
    }
}

/// The user view that crosses the API boundary. Credentials never do.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub is_verified: bool,
    pub profile: UserProfile,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            avatar: user.avatar,
            is_verified: user.is_verified,
            profile: user.profile.0,
            created_at: user.created_at,
        }
    }
}

/// DTO for registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 3,
        max = 30,
        message = "Username length must be between 3 and 30 characters."
    ))]
    pub username: String,

    #[validate(email(message = "A valid email address is required."))]
    pub email: String,

    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
}

/// DTO for login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for profile updates. Profile fields merge over the stored record.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: Option<String>,

    #[validate(nested)]
    pub profile: Option<UserProfile>,
}

/// Posting statistics for the caller, aggregated in one query.
#[derive(Debug, Serialize, FromRow)]
pub struct UserStats {
    pub total_posts: i64,
    pub lost_items: i64,
    pub found_items: i64,
    pub active_posts: i64,
    pub claimed_items: i64,
    pub returned_items: i64,
}
