//! REST API for the energy dashboard.
//!
//! Routes:
//! - `GET /`: welcome message
//! - `POST /api/upload`: CSV/XLSX consumption upload (multipart field `file`)
//! - `GET /api/forecast?region=..&period=..`: averaged 24-hour forecast
//! - `GET /api/anomalies`: isolation-forest outliers in the mock dataset
//! - `POST /api/scenarios`: create a named scenario
//! - `GET /api/users`: all users
//! - `GET /api/data[?region=..]`: stored consumption rows

pub mod error;
mod handlers;
pub mod types;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::models::{ArtifactStore, ModelError, ModelPair, ModelSource, load_or_fallback};
use crate::store::{MemoryStore, Store};
use crate::synthetic::{SyntheticSample, SyntheticSeries};

/// HTTP-facing settings, taken from `[server]` and `[storage]`.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub upload_dir: PathBuf,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub forecast_horizon_hours: usize,
}

impl ApiSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            upload_dir: config.storage.upload_dir.clone(),
            cors_origins: config.server.cors_origins.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
            forecast_horizon_hours: config.models.forecast_horizon_hours,
        }
    }
}

/// Application state shared across all request handlers.
///
/// Models and mock data are fixed after startup and read without locks;
/// the store synchronizes its own tables.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub models: ModelPair,
    /// Whether `models` came from disk or from the mock fallback.
    pub model_source: ModelSource,
    /// Dataset generated at startup; `/api/anomalies` scores it.
    pub mock_data: Vec<SyntheticSample>,
    pub settings: ApiSettings,
}

impl AppState {
    /// Generates the mock dataset, loads (or falls back to) the models, and
    /// starts with an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `ModelError` only if the fallback fit fails.
    pub fn from_config(config: &AppConfig) -> Result<Self, ModelError> {
        let mock_data = SyntheticSeries::unseeded(config.models.mock_periods).generate();
        let artifacts = ArtifactStore::new(&config.storage.artifact_dir);
        let loaded = load_or_fallback(&artifacts, &mock_data, &config.models.detector_params())?;

        Ok(Self {
            store: Arc::new(MemoryStore::new()),
            models: loaded.models,
            model_source: loaded.source,
            mock_data,
            settings: ApiSettings::from_config(config),
        })
    }
}

/// Builds the axum router with all API routes, CORS, tracing, and the
/// request body limit.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/upload", post(handlers::upload))
        .route("/api/forecast", get(handlers::get_forecast))
        .route("/api/anomalies", get(handlers::get_anomalies))
        .route("/api/scenarios", post(handlers::create_scenario))
        .route("/api/users", get(handlers::list_users))
        .route("/api/data", get(handlers::list_data))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow-listed origins with credentials; methods and headers mirror the
/// preflight request.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns the I/O error if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
