// src/models/item.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use validator::Validate;

use crate::storage::StoredImage;

/// Fixed category set; writes outside it are rejected before storage.
pub const CATEGORIES: [&str; 10] = [
    "Electronics",
    "Clothing",
    "Books",
    "Accessories",
    "Sports Equipment",
    "Keys",
    "Documents",
    "Jewelry",
    "Bags",
    "Other",
];

pub const ITEM_TYPES: [&str; 2] = ["lost", "found"];

pub const ITEM_STATUSES: [&str; 4] = ["active", "claimed", "returned", "expired"];

pub const CONTACT_METHODS: [&str; 3] = ["email", "phone", "both"];

/// Represents the 'items' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,

    /// 'lost' or 'found'.
    #[sqlx(rename = "type")]
    pub r#type: String,

    /// Lifecycle flag: 'active', 'claimed', 'returned' or 'expired'.
    pub status: String,

    pub location: String,
    pub specific_location: Option<String>,

    /// Calendar date the item was lost/found, as reported. Distinct from
    /// `created_at`, which is when the report was submitted.
    pub date_occurred: chrono::NaiveDate,

    /// Ordered upload list, stored as a JSON array.
    pub images: Json<Vec<StoredImage>>,

    pub contact_info: Json<ContactInfo>,
    pub reward: Json<Reward>,
    pub tags: Json<Vec<String>>,

    /// Bumped atomically on every single-item fetch.
    pub views: i64,
    pub last_viewed: chrono::DateTime<chrono::Utc>,

    /// Advisory expiry (creation + 90 days); nothing reaps expired rows.
    pub expires_at: chrono::DateTime<chrono::Utc>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// How the reporter wants to be reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub preferred_method: String,
}

impl ContactInfo {
    /// Applies the stored defaults: the caller's account email when none was
    /// supplied, 'email' as the preferred method.
    pub fn from_input(input: Option<ContactInfoInput>, account_email: &str) -> Self {
        let input = input.unwrap_or_default();
        Self {
            phone: input.phone.unwrap_or_default(),
            email: input.email.unwrap_or_else(|| account_email.to_string()),
            preferred_method: input.preferred_method.unwrap_or_else(|| "email".to_string()),
        }
    }
}

/// Optional reward sub-record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    #[serde(default)]
    pub offered: bool,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

impl Reward {
    pub fn from_input(input: Option<RewardInput>) -> Self {
        let input = input.unwrap_or_default();
        Self {
            offered: input.offered.unwrap_or(false),
            amount: input.amount.unwrap_or(0.0),
            description: input.description.unwrap_or_default(),
        }
    }
}

/// DTO for creating a new item.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Title length must be between 1 and 100 chars"
    ))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 1000,
        message = "Description length must be between 1 and 1000 chars"
    ))]
    pub description: String,

    #[validate(custom(function = validate_category))]
    pub category: String,

    #[validate(custom(function = validate_item_type))]
    pub r#type: String,

    #[validate(length(min = 1, max = 200))]
    pub location: String,

    #[validate(length(max = 200))]
    pub specific_location: Option<String>,

    pub date_occurred: chrono::NaiveDate,

    #[validate(nested)]
    pub contact_info: Option<ContactInfoInput>,

    #[validate(nested)]
    pub reward: Option<RewardInput>,

    pub tags: Option<Vec<String>>,
}

/// DTO for updating an item. Every field is optional; only the provided
/// ones are written.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 1000))]
    pub description: Option<String>,

    #[validate(custom(function = validate_category))]
    pub category: Option<String>,

    #[validate(custom(function = validate_item_type))]
    pub r#type: Option<String>,

    /// Any status in the enum is settable by the owner; transitions are not
    /// restricted beyond that.
    #[validate(custom(function = validate_status))]
    pub status: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub location: Option<String>,

    #[validate(length(max = 200))]
    pub specific_location: Option<String>,

    pub date_occurred: Option<chrono::NaiveDate>,

    #[validate(nested)]
    pub contact_info: Option<ContactInfoInput>,

    #[validate(nested)]
    pub reward: Option<RewardInput>,

    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ContactInfoInput {
    #[validate(length(max = 30))]
    pub phone: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(custom(function = validate_contact_method))]
    pub preferred_method: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RewardInput {
    pub offered: Option<bool>,

    #[validate(range(min = 0.0))]
    pub amount: Option<f64>,

    #[validate(length(max = 200))]
    pub description: Option<String>,
}

/// Query parameters for the public listing.
#[derive(Debug, Deserialize)]
pub struct ListItemsParams {
    pub r#type: Option<String>,
    pub category: Option<String>,

    /// Case-insensitive substring match on the stored location.
    pub location: Option<String>,

    /// Free-text search over title, description, location and tags,
    /// relevance-ranked.
    pub search: Option<String>,

    pub page: Option<i64>,
    pub limit: Option<i64>,

    /// One of: created_at (default), date_occurred, views, title.
    pub sort_by: Option<String>,

    /// 'asc' or 'desc' (default).
    pub sort_order: Option<String>,
}

/// Query parameters for the caller's own listings.
#[derive(Debug, Deserialize)]
pub struct MyItemsParams {
    pub r#type: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// An item with its author's public display fields joined in.
#[derive(Debug, Serialize, FromRow)]
pub struct ItemResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: Item,
    pub username: String,
    pub avatar: String,
}

/// Detail view: adds the author's name from the profile sub-record.
/// Credentials never travel through this struct.
#[derive(Debug, Serialize, FromRow)]
pub struct ItemDetailResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: Item,
    pub username: String,
    pub avatar: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Offset-pagination envelope metadata.
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub current: i64,
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total_count: i64) -> Self {
        Self {
            current: page,
            total: (total_count + limit - 1) / limit,
            has_next: page * limit < total_count,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemListResponse {
    pub items: Vec<ItemResponse>,
    pub pagination: Pagination,
}

fn validate_category(value: &str) -> Result<(), validator::ValidationError> {
    if CATEGORIES.contains(&value) {
        return Ok(());
    }
    Err(validator::ValidationError::new("unknown_category"))
}

fn validate_item_type(value: &str) -> Result<(), validator::ValidationError> {
    if ITEM_TYPES.contains(&value) {
        return Ok(());
    }
    Err(validator::ValidationError::new("unknown_item_type"))
}

fn validate_status(value: &str) -> Result<(), validator::ValidationError> {
    if ITEM_STATUSES.contains(&value) {
        return Ok(());
    }
    Err(validator::ValidationError::new("unknown_status"))
}

fn validate_contact_method(value: &str) -> Result<(), validator::ValidationError> {
    if CONTACT_METHODS.contains(&value) {
        return Ok(());
    }
    Err(validator::ValidationError::new("unknown_contact_method"))
}
