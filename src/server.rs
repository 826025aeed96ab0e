//! JSON HTTP API.
//!
//! Exposes the tracking pipeline over HTTP for dashboard frontends and
//! schedulers. All handlers share one connection pool owned by the server
//! task; a provider client is built per request from configuration.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/track` | Resolve and record keyword/device combinations |
//! | `POST` | `/ai` | AI-mode mention check for a business/domain pair |
//! | `POST` | `/refresh` | One batch pass over all tracked identities |
//! | `GET`  | `/history` | Current snapshots for a user's domain |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses use one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "keywords must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `provider_error` (502), `internal`
//! (500). Provider failures deliberately collapse to the generic "error
//! performing search" message; a query that ranks nowhere is a normal
//! success payload, not an error.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::ai_mode::{self, AiCheckRequest};
use crate::config::Config;
use crate::db;
use crate::history;
use crate::models::{Device, SearchEngine};
use crate::provider::{ProviderError, SerpClient};
use crate::refresh;
use crate::store::SqliteSnapshotStore;
use crate::track::{self, TrackRequest};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
}

/// Starts the HTTP server on the configured bind address.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/track", post(track_handler))
        .route("/ai", post(ai_handler))
        .route("/refresh", post(refresh_handler))
        .route("/history", get(history_handler))
        .layer(cors)
        .with_state(state);

    let bind = &config.server.bind;
    info!(%bind, "starting HTTP server");
    println!("Listening on http://{}", bind);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// API error mapped onto the JSON error envelope.
enum ApiError {
    BadRequest(String),
    Provider(String),
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::Provider(message) => (StatusCode::BAD_GATEWAY, "provider_error", message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = json!({ "error": { "code": code, "message": message } });
        (status, Json(body)).into_response()
    }
}

/// Collapse a pipeline error onto the API taxonomy. Provider failures get
/// the generic user-facing message; storage failures are internal.
fn map_pipeline_error(error: anyhow::Error) -> ApiError {
    let is_provider = error
        .chain()
        .any(|cause| cause.downcast_ref::<ProviderError>().is_some());
    if is_provider {
        return ApiError::Provider("error performing search".to_string());
    }
    let is_storage = error
        .chain()
        .any(|cause| cause.downcast_ref::<sqlx::Error>().is_some());
    if is_storage {
        return ApiError::Internal("internal error".to_string());
    }
    ApiError::BadRequest(error.to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct TrackBody {
    user_id: Option<String>,
    keywords: String,
    domain: String,
    #[serde(default)]
    devices: Vec<Device>,
    location: Option<String>,
    engine: Option<SearchEngine>,
}

async fn track_handler(
    State(state): State<AppState>,
    Json(body): Json<TrackBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = SqliteSnapshotStore::new(state.pool.clone());
    let provider = SerpClient::new(&state.config.provider)
        .map_err(|error| ApiError::Internal(error.to_string()))?;

    let request = TrackRequest {
        user_id: body
            .user_id
            .unwrap_or_else(|| state.config.tracking.default_user.clone()),
        keywords: body.keywords,
        domain: body.domain,
        devices: body.devices,
        location: body.location,
        engine: body.engine.unwrap_or(SearchEngine::Google),
    };

    let outcomes = track::track(
        &provider,
        &store,
        &request,
        state.config.tracking.max_depth,
    )
    .await
    .map_err(map_pipeline_error)?;

    let found = outcomes.iter().any(|outcome| outcome.rank > 0);
    Ok(Json(json!({ "success": found, "results": outcomes })))
}

#[derive(Deserialize)]
struct AiBody {
    user_id: Option<String>,
    keyword: String,
    business: String,
    domain: String,
}

async fn ai_handler(
    State(state): State<AppState>,
    Json(body): Json<AiBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = SqliteSnapshotStore::new(state.pool.clone());
    let provider = SerpClient::new(&state.config.provider)
        .map_err(|error| ApiError::Internal(error.to_string()))?;

    let request = AiCheckRequest {
        user_id: body
            .user_id
            .unwrap_or_else(|| state.config.tracking.default_user.clone()),
        keyword: body.keyword,
        business: body.business,
        domain: body.domain,
    };

    let outcome = ai_mode::check(&provider, &store, &request)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(json!({ "success": true, "result": outcome })))
}

async fn refresh_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = SqliteSnapshotStore::new(state.pool.clone());
    let provider = SerpClient::new(&state.config.provider)
        .map_err(|error| ApiError::Internal(error.to_string()))?;

    let shutdown = AtomicBool::new(false);
    let report = refresh::run_pass(
        &provider,
        &store,
        state.config.tracking.max_depth,
        &shutdown,
    )
    .await
    .map_err(map_pipeline_error)?;

    Ok(Json(json!({ "success": true, "report": report })))
}

#[derive(Deserialize)]
struct HistoryParams {
    user: Option<String>,
    domain: Option<String>,
    keyword: Option<String>,
}

async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(domain) = params.domain else {
        return Err(ApiError::BadRequest(
            "domain query parameter is required".to_string(),
        ));
    };
    let user = params
        .user
        .unwrap_or_else(|| state.config.tracking.default_user.clone());

    let store = SqliteSnapshotStore::new(state.pool.clone());
    let rows = history::domain_history(&store, &user, &domain, params.keyword.as_deref())
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(json!({ "success": true, "results": rows })))
}
