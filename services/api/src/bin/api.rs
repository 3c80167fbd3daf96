//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, EstimatingMeasurer},
    config::Config,
    error::ApiError,
    web::{
        delete_annotation_handler, edit_note_handler, get_position_handler,
        get_reading_time_handler, list_annotations_handler, require_reader, rest::ApiDoc,
        state::AppState, upload_book_handler, ws_handler,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter =
        Arc::new(DbAdapter::new(db_pool).with_preview_fraction(config.preview_fraction));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter.clone(),
        content: db_adapter,
        measurer: Arc::new(EstimatingMeasurer::new()),
        config: config.clone(),
    });

    // --- 4. CORS ---
    let allowed_origin = config
        .allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(api_lib::web::middleware::READER_ID_HEADER),
        ]);

    // --- 5. Create the Web Router ---
    let protected_routes = Router::new()
        .route("/books", post(upload_book_handler))
        .route("/books/{book_id}/position", get(get_position_handler))
        .route("/books/{book_id}/annotations", get(list_annotations_handler))
        .route(
            "/books/{book_id}/annotations/{annotation_id}",
            patch(edit_note_handler).delete(delete_annotation_handler),
        )
        .route("/books/{book_id}/reading-time", get(get_reading_time_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn(require_reader));

    let api_router = Router::new()
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
