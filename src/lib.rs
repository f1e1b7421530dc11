//! folio-cms - library for app logic and testing

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod otp;
pub mod render;
pub mod routes;
pub mod session;
pub mod slug;
pub mod state;
pub mod storage;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::state::AppState;
use crate::store::Store;

/// Request body cap. Uploads are limited to 10 MB, plus multipart framing.
pub const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

/// Configure CORS from ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to the local dev frontends.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect::<Vec<HeaderValue>>()
        })
        .filter(|origins| !origins.is_empty())
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();

    let mut router = Router::new()
        // Public pages
        .route("/", get(routes::pages::home))
        .route("/blogs", get(routes::pages::blog_index))
        .route("/blog/{slug}", get(routes::pages::blog_post))
        .route("/blog/category/{category}", get(routes::pages::blog_category))
        .route("/admin", get(routes::pages::admin))
        .route("/rss.xml", get(routes::rss::rss_feed))
        // OTP gate and sessions
        .route("/send-otp", post(routes::auth::send_otp))
        .route("/verify-otp", post(routes::auth::verify_otp))
        .route("/api/auth/verify", post(routes::auth::verify_session))
        .route("/api/auth/logout", post(routes::auth::logout))
        // Public JSON
        .route("/api/blogs", get(routes::blog::list_published))
        .route("/api/blogs/{slug}", get(routes::blog::get_published))
        .route("/api/sections", get(routes::sections::list_published))
        // Admin API
        .route(
            "/api/admin/blogs",
            get(routes::blog::list_all).post(routes::blog::save),
        )
        .route(
            "/api/admin/blogs/{id}",
            get(routes::blog::get_by_id)
                .put(routes::blog::update)
                .delete(routes::blog::delete),
        )
        .route(
            "/api/admin/blogs/{id}/attachments",
            post(routes::upload::add_blog_attachment),
        )
        .route(
            "/api/admin/blogs/{id}/attachments/{attachment_id}",
            delete(routes::upload::remove_blog_attachment),
        )
        .route(
            "/api/admin/sections",
            get(routes::sections::list_all).post(routes::sections::save),
        )
        .route(
            "/api/admin/sections/{id}",
            get(routes::sections::get_by_id)
                .put(routes::sections::update)
                .delete(routes::sections::delete),
        )
        .route(
            "/api/admin/sections/{id}/attachments",
            post(routes::upload::add_section_attachment),
        )
        .route(
            "/api/admin/sections/{id}/attachments/{attachment_id}",
            delete(routes::upload::remove_section_attachment),
        )
        .route(
            "/api/admin/sections/{id}/cv",
            post(routes::upload::upload_cv),
        )
        // Health
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database));

    if let Some(root) = state.storage.local_root() {
        router = router.nest_service(storage::LOCAL_PUBLIC_PREFIX, ServeDir::new(root));
    }

    router
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // Multipart has its own 2 MB default; lift it to the global cap
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

async fn open_store() -> Result<Store, sqlx::Error> {
    if std::env::var("DATABASE_URL").is_err() {
        tracing::info!("DATABASE_URL not set. Using the in-memory store.");
        return Ok(Store::memory());
    }

    let pool = db::init_pool(&db::DbConfig::default()).await?;
    db::run_migrations(&pool).await?;
    Ok(Store::Postgres(pool))
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Dropping the guards stops the background log writers.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    let config = AppConfig::from_env();
    if let Err(reason) = config.validate_for_production() {
        tracing::error!("Refusing to start: {}", reason);
        std::process::exit(1);
    }

    let store = match open_store().await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize the database");
            std::process::exit(1);
        }
    };

    let state = AppState::new(config, store);
    tracing::info!(
        store = state.store.kind(),
        mailer = state.mailer.kind(),
        "application state ready"
    );

    otp::spawn_sweeper(
        state.store.clone(),
        Duration::from_secs(state.config.otp_sweep_interval_secs.max(1)),
    );

    let addr: SocketAddr = match format!("{}:{}", state.config.host, state.config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "Invalid HOST/PORT configuration");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind to address");
            std::process::exit(1);
        }
    };
    tracing::info!("Starting server on {}", addr);

    let app = create_app(state);
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %e, "Server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::TestApp;
    use axum::http::StatusCode;

    #[test]
    fn test_create_app_returns_router() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(AppConfig::for_local(dir.path()), Store::memory());
        let _app = create_app(state);
    }

    #[tokio::test]
    async fn test_local_storage_is_served() {
        let app = TestApp::new();
        let bucket = app.storage_dir.path().join(storage::BLOG_UPLOADS);
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join("note.txt"), b"hello").unwrap();

        let (status, bytes) = app.get("/storage/blog-uploads/note.txt", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = TestApp::new();
        let (status, _) = app.get("/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
