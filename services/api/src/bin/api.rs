//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, HttpBadgeAdapter},
    config::Config,
    error::ApiError,
    web::{build_router, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::Router;
use reading_tracker_core::{BadgeEvaluator, NoBadges, ReadingEngine};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
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
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Badge Collaborator ---
    let badges: Arc<dyn BadgeEvaluator> = match &config.badge_service_url {
        Some(url) => {
            info!("Badge evaluation delegated to {}", url);
            Arc::new(
                HttpBadgeAdapter::new(url.clone(), config.badge_service_timeout)
                    .map_err(|e| ApiError::Internal(e.to_string()))?,
            )
        }
        None => {
            info!("BADGE_SERVICE_URL not set; badges will not be awarded");
            Arc::new(NoBadges)
        }
    };

    // --- 4. Build the Engine and the Shared AppState ---
    let engine = ReadingEngine::new(db_adapter)
        .with_badges(badges)
        .with_consistency(config.consistency);
    info!("Progress updates run in {} mode", engine.consistency());

    let app_state = Arc::new(AppState {
        engine: Arc::new(engine),
        config: config.clone(),
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // --- 5. Create the Web Router ---
    let app = Router::new()
        .merge(build_router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

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
