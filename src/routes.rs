// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{auth, items, users},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, items, users).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, image store).
pub fn create_router(state: AppState) -> Router {
    let origin: HeaderValue = state
        .config
        .client_url
        .parse()
        .expect("CLIENT_URL must be a valid origin");

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        // Protected account routes
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route("/profile", put(auth::update_profile))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let item_routes = Router::new()
        .route("/", get(items::list_items))
        .route("/{id}", get(items::get_item))
        // Protected lifecycle routes
        .merge(
            Router::new()
                .route("/", post(items::create_item))
                .route("/user/me", get(items::list_my_items))
                .route(
                    "/{id}",
                    put(items::update_item).delete(items::delete_item),
                )
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        // Multipart submissions carry up to 5 images of 5MB each.
        .layer(DefaultBodyLimit::max(30 * 1024 * 1024));

    let user_routes = Router::new()
        .route("/profile/{id}", get(users::get_profile))
        .merge(
            Router::new()
                .route("/stats", get(users::stats))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/items", item_routes)
        .nest("/api/users", user_routes)
        // Locally stored uploads are served straight from disk.
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
