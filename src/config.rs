// src/config.rs

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    /// Origin allowed by CORS (the SPA dev server).
    pub client_url: String,
    /// Directory where locally stored uploads live.
    pub upload_dir: String,
    /// Image storage backend: "local" or "disabled".
    pub image_storage: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://lostfound.db".to_string());

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7 * 24 * 60 * 60);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let client_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());

        let image_storage = env::var("IMAGE_STORAGE").unwrap_or_else(|_| "local".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            client_url,
            upload_dir,
            image_storage,
        }
    }
}
