use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as DbJson};

use crate::{
    error::AppError,
    models::item::{
        ContactInfo, CreateItemRequest, Item, ItemDetailResponse, ItemListResponse,
        ItemResponse, ListItemsParams, MyItemsParams, Pagination, Reward, UpdateItemRequest,
    },
    storage::{DynImageStore, StoredImage},
    utils::{html::clean_html, jwt::Claims},
};
use validator::Validate;

/// Column list shared by every item query; the table is always aliased `i`.
const ITEM_SELECT: &str = "i.id, i.user_id, i.title, i.description, i.category, i.type, \
     i.status, i.location, i.specific_location, i.date_occurred, i.images, i.contact_info, \
     i.reward, i.tags, i.views, i.last_viewed, i.expires_at, i.created_at, i.updated_at";

const MAX_IMAGES: usize = 5;
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// List active items with filters, search, sorting and offset pagination.
pub async fn list_items(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListItemsParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(12).clamp(1, 100);
    let offset = (page - 1) * limit;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {ITEM_SELECT}, u.username, u.avatar \
         FROM items i JOIN users u ON u.id = i.user_id"
    ));
    push_listing_filters(&mut builder, &params);

    builder.push(" ORDER BY ");
    if let Some(search) = &params.search {
        // Relevance first; the requested sort key only breaks score ties.
        push_relevance_score(&mut builder, search);
        builder.push(" DESC, ");
    }
    builder.push(format!(
        "i.{} {}, i.id DESC",
        sort_column(params.sort_by.as_deref()),
        sort_direction(params.sort_order.as_deref())
    ));

    builder.push(" LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let items: Vec<ItemResponse> = builder.build_query_as().fetch_all(&pool).await?;

    let mut count_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM items i");
    push_listing_filters(&mut count_builder, &params);
    let total_count: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;

    Ok(Json(ItemListResponse {
        items,
        pagination: Pagination::new(page, limit, total_count),
    }))
}

/// Get a single item by ID.
///
/// Every fetch bumps the view counter as an atomic store-level increment;
/// a read-modify-write here would lose updates under concurrent traffic.
pub async fn get_item(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE items SET views = views + 1, last_viewed = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Item not found".to_string()));
    }

    let sql = format!(
        "SELECT {ITEM_SELECT}, u.username, u.avatar, \
                json_extract(u.profile, '$.first_name') AS first_name, \
                json_extract(u.profile, '$.last_name') AS last_name \
         FROM items i JOIN users u ON u.id = i.user_id \
         WHERE i.id = ?"
    );
    let item = sqlx::query_as::<_, ItemDetailResponse>(&sql)
        .bind(id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(item))
}

/// Create a new item from a multipart submission.
///
/// Image uploads are best-effort: a failed upload is logged and dropped,
/// the remaining images and the item itself still go through.
pub async fn create_item(
    State(pool): State<SqlitePool>,
    State(images): State<DynImageStore>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_item_form(&mut multipart).await?;
    let payload: CreateItemRequest = serde_json::from_value(Value::Object(form.fields))?;
    payload.validate()?;

    let user_id = claims.user_id();
    let uploaded = upload_images(&images, form.uploads).await;

    let contact_info = ContactInfo::from_input(payload.contact_info, &claims.email);
    let reward = Reward::from_input(payload.reward);
    let tags = payload.tags.unwrap_or_default();
    let description = clean_html(&payload.description);

    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO items
            (user_id, title, description, category, type, status, location,
             specific_location, date_occurred, images, contact_info, reward,
             tags, views, last_viewed, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&payload.title)
    .bind(&description)
    .bind(&payload.category)
    .bind(&payload.r#type)
    .bind(&payload.location)
    .bind(&payload.specific_location)
    .bind(payload.date_occurred)
    .bind(DbJson(&uploaded))
    .bind(DbJson(&contact_info))
    .bind(DbJson(&reward))
    .bind(DbJson(&tags))
    .bind(now)
    .bind(now + Duration::days(90))
    .bind(now)
    .bind(now)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create item: {:?}", e);
        AppError::from(e)
    })?;

    let item = fetch_item_response(&pool, id).await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Update an item. Owner-only; newly uploaded images are appended to the
/// existing list, never replacing it.
pub async fn update_item(
    State(pool): State<SqlitePool>,
    State(images): State<DynImageStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let item = fetch_item(&pool, id).await?;

    if item.user_id != claims.user_id() {
        return Err(AppError::Forbidden(
            "Not authorized to update this item".to_string(),
        ));
    }

    let form = read_item_form(&mut multipart).await?;
    let payload: UpdateItemRequest = serde_json::from_value(Value::Object(form.fields))?;
    payload.validate()?;

    let new_images = upload_images(&images, form.uploads).await;

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE items SET updated_at = ");
    builder.push_bind(Utc::now());

    if let Some(title) = payload.title {
        builder.push(", title = ");
        builder.push_bind(title);
    }
    if let Some(description) = payload.description {
        builder.push(", description = ");
        builder.push_bind(clean_html(&description));
    }
    if let Some(category) = payload.category {
        builder.push(", category = ");
        builder.push_bind(category);
    }
    if let Some(item_type) = payload.r#type {
        builder.push(", type = ");
        builder.push_bind(item_type);
    }
    if let Some(status) = payload.status {
        builder.push(", status = ");
        builder.push_bind(status);
    }
    if let Some(location) = payload.location {
        builder.push(", location = ");
        builder.push_bind(location);
    }
    if let Some(specific_location) = payload.specific_location {
        builder.push(", specific_location = ");
        builder.push_bind(specific_location);
    }
    if let Some(date_occurred) = payload.date_occurred {
        builder.push(", date_occurred = ");
        builder.push_bind(date_occurred);
    }
    if let Some(contact_info) = payload.contact_info {
        builder.push(", contact_info = ");
        builder.push_bind(DbJson(ContactInfo::from_input(
            Some(contact_info),
            &claims.email,
        )));
    }
    if let Some(reward) = payload.reward {
        builder.push(", reward = ");
        builder.push_bind(DbJson(Reward::from_input(Some(reward))));
    }
    if let Some(tags) = payload.tags {
        builder.push(", tags = ");
        builder.push_bind(DbJson(tags));
    }
    if !new_images.is_empty() {
        let mut merged = item.images.0.clone();
        merged.extend(new_images);
        builder.push(", images = ");
        builder.push_bind(DbJson(merged));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool).await?;

    let updated = fetch_item_response(&pool, id).await?;

    Ok(Json(updated))
}

/// Delete an item. Owner-only.
///
/// The record goes first; stored images are then cleaned up one by one,
/// each failure logged, none of them blocking or reversing the deletion.
pub async fn delete_item(
    State(pool): State<SqlitePool>,
    State(images): State<DynImageStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let item = fetch_item(&pool, id).await?;

    if item.user_id != claims.user_id() {
        return Err(AppError::Forbidden(
            "Not authorized to delete this item".to_string(),
        ));
    }

    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await?;

    for image in item.images.0 {
        if let Err(err) = images.delete(&image.storage_key).await {
            tracing::error!(
                "Failed to delete stored image {}: {}",
                image.storage_key,
                err
            );
        }
    }

    Ok(Json(serde_json::json!({ "message": "Item deleted successfully" })))
}

/// List the caller's own items, newest first, with optional type/status
/// filters. Unlike the public listing there is no active-only predicate.
pub async fn list_my_items(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<MyItemsParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(12).clamp(1, 100);
    let offset = (page - 1) * limit;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {ITEM_SELECT}, u.username, u.avatar \
         FROM items i JOIN users u ON u.id = i.user_id \
         WHERE i.user_id = "
    ));
    builder.push_bind(user_id);
    push_owner_filters(&mut builder, &params);
    builder.push(" ORDER BY i.created_at DESC, i.id DESC LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let items: Vec<ItemResponse> = builder.build_query_as().fetch_all(&pool).await?;

    let mut count_builder =
        QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM items i WHERE i.user_id = ");
    count_builder.push_bind(user_id);
    push_owner_filters(&mut count_builder, &params);
    let total_count: i64 = count_builder.build_query_scalar().fetch_one(&pool).await?;

    Ok(Json(ItemListResponse {
        items,
        pagination: Pagination::new(page, limit, total_count),
    }))
}

/// Appends the public-listing predicate: always active-only, the other
/// filters only when supplied (absent means no filter, not "match empty").
fn push_listing_filters(builder: &mut QueryBuilder<'_, Sqlite>, params: &ListItemsParams) {
    builder.push(" WHERE i.status = 'active'");

    if let Some(item_type) = &params.r#type {
        builder.push(" AND i.type = ");
        builder.push_bind(item_type.clone());
    }
    if let Some(category) = &params.category {
        builder.push(" AND i.category = ");
        builder.push_bind(category.clone());
    }
    if let Some(location) = &params.location {
        // SQLite LIKE is case-insensitive for ASCII.
        builder.push(" AND i.location LIKE ");
        builder.push_bind(format!("%{}%", location));
    }
    if let Some(search) = &params.search {
        let pattern = format!("%{}%", search);
        builder.push(" AND (i.title LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR i.description LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR i.location LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR i.tags LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

fn push_owner_filters(builder: &mut QueryBuilder<'_, Sqlite>, params: &MyItemsParams) {
    if let Some(item_type) = &params.r#type {
        builder.push(" AND i.type = ");
        builder.push_bind(item_type.clone());
    }
    if let Some(status) = &params.status {
        builder.push(" AND i.status = ");
        builder.push_bind(status.clone());
    }
}

/// Weighted relevance score for free-text search: title counts most, then
/// tags and description, then location. Rows that match nothing are already
/// excluded by the WHERE clause.
fn push_relevance_score(builder: &mut QueryBuilder<'_, Sqlite>, search: &str) {
    let pattern = format!("%{}%", search);
    builder.push("(CASE WHEN i.title LIKE ");
    builder.push_bind(pattern.clone());
    builder.push(" THEN 4 ELSE 0 END + CASE WHEN i.tags LIKE ");
    builder.push_bind(pattern.clone());
    builder.push(" THEN 2 ELSE 0 END + CASE WHEN i.description LIKE ");
    builder.push_bind(pattern.clone());
    builder.push(" THEN 2 ELSE 0 END + CASE WHEN i.location LIKE ");
    builder.push_bind(pattern);
    builder.push(" THEN 1 ELSE 0 END)");
}

/// Whitelist of sortable columns; anything else falls back to recency.
/// The column name is interpolated into SQL, so it must come from here.
fn sort_column(sort_by: Option<&str>) -> &'static str {
    match sort_by {
        Some("date_occurred") => "date_occurred",
        Some("views") => "views",
        Some("title") => "title",
        _ => "created_at",
    }
}

fn sort_direction(sort_order: Option<&str>) -> &'static str {
    match sort_order {
        Some("asc") => "ASC",
        _ => "DESC",
    }
}

struct ItemForm {
    fields: Map<String, Value>,
    uploads: Vec<(Bytes, String)>,
}

/// Reads a multipart submission: `images` parts are collected as uploads,
/// everything else becomes a field. The structured sub-documents
/// (contact_info, reward, tags) arrive as JSON-encoded text parts.
async fn read_item_form(multipart: &mut Multipart) -> Result<ItemForm, AppError> {
    let mut fields = Map::new();
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "images" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            if !content_type.starts_with("image/") {
                return Err(AppError::BadRequest(
                    "Only image files are allowed".to_string(),
                ));
            }
            let data = field.bytes().await?;
            if data.len() > MAX_IMAGE_BYTES {
                return Err(AppError::BadRequest(
                    "Image exceeds the 5MB size limit".to_string(),
                ));
            }
            uploads.push((data, content_type));
        } else {
            let text = field.text().await?;
            let value = match name.as_str() {
                "contact_info" | "reward" | "tags" => serde_json::from_str(&text)?,
                _ => Value::String(text),
            };
            fields.insert(name, value);
        }
    }

    if uploads.len() > MAX_IMAGES {
        return Err(AppError::BadRequest(
            "At most 5 images per item".to_string(),
        ));
    }

    Ok(ItemForm { fields, uploads })
}

/// Pushes each upload through the configured store. Failures are logged and
/// the image dropped; the surviving images keep their submission order.
async fn upload_images(
    images: &DynImageStore,
    uploads: Vec<(Bytes, String)>,
) -> Vec<StoredImage> {
    let mut stored = Vec::new();
    for (data, content_type) in uploads {
        match images.upload(data, &content_type).await {
            Ok(image) => stored.push(image),
            Err(err) => tracing::error!("Image upload failed: {}", err),
        }
    }
    stored
}

async fn fetch_item(pool: &SqlitePool, id: i64) -> Result<Item, AppError> {
    let sql = format!("SELECT {ITEM_SELECT} FROM items i WHERE i.id = ?");
    sqlx::query_as::<_, Item>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Item not found".to_string()))
}

async fn fetch_item_response(pool: &SqlitePool, id: i64) -> Result<ItemResponse, AppError> {
    let sql = format!(
        "SELECT {ITEM_SELECT}, u.username, u.avatar \
         FROM items i JOIN users u ON u.id = i.user_id \
         WHERE i.id = ?"
    );
    sqlx::query_as::<_, ItemResponse>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Item not found".to_string()))
}
