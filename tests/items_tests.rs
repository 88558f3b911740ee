// tests/items_tests.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lostfound::config::Config;
use lostfound::error::AppError;
use lostfound::state::AppState;
use lostfound::storage::{DynImageStore, ImageStore, PlaceholderImageStore, StoredImage};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL and a handle on the app's database.
async fn spawn_app() -> (String, SqlitePool) {
    spawn_app_with(Arc::new(PlaceholderImageStore)).await
}

async fn spawn_app_with(images: DynImageStore) -> (String, SqlitePool) {
    // A single connection keeps the in-memory database alive and shared
    // between the server and the test's own queries.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        client_url: "http://localhost:3000".to_string(),
        upload_dir: "uploads".to_string(),
        image_storage: "disabled".to_string(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        images,
    };

    let app = lostfound::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

/// Registers a fresh user and returns (token, email).
async fn register_user(client: &reqwest::Client, address: &str) -> (String, String) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let email = format!("{}@campus.test", username);

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": username,
            "email": email,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed");

    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    (body["token"].as_str().unwrap().to_string(), email)
}

fn item_form(
    title: &str,
    item_type: &str,
    category: &str,
    location: &str,
) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .text("title", title.to_string())
        .text("description", format!("{} report", title))
        .text("category", category.to_string())
        .text("type", item_type.to_string())
        .text("location", location.to_string())
        .text("date_occurred", "2025-06-01")
}

fn image_part() -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(vec![0u8; 32])
        .file_name("photo.jpg")
        .mime_str("image/jpeg")
        .unwrap()
}

async fn create_item(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    form: reqwest::multipart::Form,
) -> serde_json::Value {
    let response = client
        .post(format!("{}/api/items", address))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("Create item failed");

    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

#[tokio::test]
async fn create_item_applies_defaults() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, email) = register_user(&client, &address).await;

    let item = create_item(
        &client,
        &address,
        &token,
        item_form("Blue backpack", "lost", "Bags", "Library"),
    )
    .await;

    assert_eq!(item["status"], "active");
    assert_eq!(item["views"], 0);
    assert_eq!(item["type"], "lost");
    assert_eq!(item["category"], "Bags");
    // Contact email falls back to the account email
    assert_eq!(item["contact_info"]["email"], email);
    assert_eq!(item["contact_info"]["preferred_method"], "email");
    assert_eq!(item["reward"]["offered"], false);
    assert_eq!(item["tags"], serde_json::json!([]));
    // Author display data is joined in
    assert!(item["username"].as_str().unwrap().starts_with("u_"));
    // Credentials never cross the boundary
    assert!(item.get("password").is_none());
}

#[tokio::test]
async fn create_item_rejects_unknown_category() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let response = client
        .post(format!("{}/api/items", address))
        .bearer_auth(&token)
        .multipart(item_form("Thing", "lost", "Spaceships", "Library"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn create_item_requires_auth() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/items", address))
        .multipart(item_form("Thing", "lost", "Keys", "Gym"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn create_item_sanitizes_description() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let form = item_form("Red wallet", "lost", "Accessories", "Cafeteria")
        .text("description", "<script>alert(1)</script>Brown leather");
    let item = create_item(&client, &address, &token, form).await;

    let description = item["description"].as_str().unwrap();
    assert!(!description.contains("script"));
    assert!(description.contains("Brown leather"));
}

#[tokio::test]
async fn view_counter_steps_on_each_fetch() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let item = create_item(
        &client,
        &address,
        &token,
        item_form("Calculator", "found", "Electronics", "Lab"),
    )
    .await;
    let id = item["id"].as_i64().unwrap();
    assert_eq!(item["views"], 0);

    let first: serde_json::Value = client
        .get(format!("{}/api/items/{}", address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["views"], 1);

    let second: serde_json::Value = client
        .get(format!("{}/api/items/{}", address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["views"], 2);

    let first_viewed =
        chrono::DateTime::parse_from_rfc3339(first["last_viewed"].as_str().unwrap()).unwrap();
    let second_viewed =
        chrono::DateTime::parse_from_rfc3339(second["last_viewed"].as_str().unwrap()).unwrap();
    assert!(second_viewed > first_viewed, "last_viewed must increase");

    // Detail view joins the author's profile name subset
    assert!(second.get("username").is_some());
    assert!(second.get("first_name").is_some());
}

#[tokio::test]
async fn concurrent_views_lose_no_increments() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let item = create_item(
        &client,
        &address,
        &token,
        item_form("Umbrella", "found", "Other", "Bus stop"),
    )
    .await;
    let id = item["id"].as_i64().unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = format!("{}/api/items/{}", address, id);
        handles.push(tokio::spawn(async move {
            let response = client.get(&url).send().await.unwrap();
            assert_eq!(response.status().as_u16(), 200);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let views: i64 = sqlx::query_scalar("SELECT views FROM items WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(views, 10);
}

#[tokio::test]
async fn non_owner_update_is_forbidden_and_changes_nothing() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_user(&client, &address).await;
    let (other_token, _) = register_user(&client, &address).await;

    let item = create_item(
        &client,
        &address,
        &owner_token,
        item_form("Physics textbook", "lost", "Books", "Lecture hall"),
    )
    .await;
    let id = item["id"].as_i64().unwrap();

    let before: (String, String) =
        sqlx::query_as("SELECT title, updated_at FROM items WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();

    let response = client
        .put(format!("{}/api/items/{}", address, id))
        .bearer_auth(&other_token)
        .multipart(reqwest::multipart::Form::new().text("title", "Hijacked"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let after: (String, String) =
        sqlx::query_as("SELECT title, updated_at FROM items WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(before, after, "forbidden update must leave the row unchanged");
}

#[tokio::test]
async fn non_owner_delete_is_forbidden_and_item_survives() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_user(&client, &address).await;
    let (other_token, _) = register_user(&client, &address).await;

    let item = create_item(
        &client,
        &address,
        &owner_token,
        item_form("Student ID card", "found", "Documents", "Cafeteria"),
    )
    .await;
    let id = item["id"].as_i64().unwrap();

    let response = client
        .delete(format!("{}/api/items/{}", address, id))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let fetched: serde_json::Value = client
        .get(format!("{}/api/items/{}", address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["title"], "Student ID card");
}

#[tokio::test]
async fn owner_can_update_and_delete() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let item = create_item(
        &client,
        &address,
        &token,
        item_form("Silver ring", "found", "Jewelry", "Gym"),
    )
    .await;
    let id = item["id"].as_i64().unwrap();

    // Any enum status is settable by the owner
    let updated: serde_json::Value = client
        .put(format!("{}/api/items/{}", address, id))
        .bearer_auth(&token)
        .multipart(
            reqwest::multipart::Form::new()
                .text("title", "Silver ring (engraved)")
                .text("status", "claimed"),
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["title"], "Silver ring (engraved)");
    assert_eq!(updated["status"], "claimed");

    let response = client
        .delete(format!("{}/api/items/{}", address, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .get(format!("{}/api/items/{}", address, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn update_appends_images_instead_of_replacing() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let form = item_form("Camera", "lost", "Electronics", "Auditorium")
        .part("images", image_part());
    let item = create_item(&client, &address, &token, form).await;
    let id = item["id"].as_i64().unwrap();
    assert_eq!(item["images"].as_array().unwrap().len(), 1);

    let updated: serde_json::Value = client
        .put(format!("{}/api/items/{}", address, id))
        .bearer_auth(&token)
        .multipart(reqwest::multipart::Form::new().part("images", image_part()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["images"].as_array().unwrap().len(), 2);
}

/// Image store that fails its second upload, to exercise the best-effort
/// contract: the surviving images are kept and the request still succeeds.
struct FlakyImageStore {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ImageStore for FlakyImageStore {
    async fn upload(
        &self,
        _data: bytes::Bytes,
        _content_type: &str,
    ) -> Result<StoredImage, AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 1 {
            return Err(AppError::InternalServerError(
                "image backend offline".to_string(),
            ));
        }
        Ok(StoredImage {
            url: format!("http://images.test/{}.jpg", call),
            storage_key: format!("key-{}", call),
        })
    }

    async fn delete(&self, _storage_key: &str) -> Result<(), AppError> {
        Ok(())
    }
}

#[tokio::test]
async fn partial_image_upload_failure_keeps_the_rest() {
    let (address, _pool) = spawn_app_with(Arc::new(FlakyImageStore {
        calls: AtomicUsize::new(0),
    }))
    .await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let form = item_form("Laptop sleeve", "lost", "Accessories", "Library")
        .part("images", image_part())
        .part("images", image_part())
        .part("images", image_part());

    // The 2nd upload fails; the create still returns 201 with 2 images.
    let item = create_item(&client, &address, &token, form).await;
    assert_eq!(item["images"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn rejects_non_image_upload_parts() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&client, &address).await;

    let part = reqwest::multipart::Part::bytes(vec![0u8; 8])
        .file_name("notes.txt")
        .mime_str("text/plain")
        .unwrap();
    let form = item_form("Gloves", "found", "Clothing", "Track").part("images", part);

    let response = client
        .post(format!("{}/api/items", address))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn my_items_lists_only_the_callers_reports() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (token_a, _) = register_user(&client, &address).await;
    let (token_b, _) = register_user(&client, &address).await;

    create_item(
        &client,
        &address,
        &token_a,
        item_form("Scarf", "lost", "Clothing", "Quad"),
    )
    .await;
    create_item(
        &client,
        &address,
        &token_a,
        item_form("Water bottle", "found", "Other", "Quad"),
    )
    .await;
    create_item(
        &client,
        &address,
        &token_b,
        item_form("Charger", "lost", "Electronics", "Dorm"),
    )
    .await;

    let mine: serde_json::Value = client
        .get(format!("{}/api/items/user/me", address))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["items"].as_array().unwrap().len(), 2);

    let lost_only: serde_json::Value = client
        .get(format!("{}/api/items/user/me?type=lost", address))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let lost_items = lost_only["items"].as_array().unwrap();
    assert_eq!(lost_items.len(), 1);
    assert_eq!(lost_items[0]["title"], "Scarf");

    let response = client
        .get(format!("{}/api/items/user/me", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}
