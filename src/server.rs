//! JSON HTTP server.
//!
//! Exposes library search to browser front-ends and scripts.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?groups=A,tag:x&q=...&ignore_case=true` | Search groupings |
//! | `GET`  | `/collections` | List library collections |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_pattern", "message": "invalid pattern: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_pattern` (400),
//! `library_error` (502).

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::context::AppContext;
use crate::error::{LibraryError, SearchError};
use crate::library::Grouping;
use crate::models::{Collection, SearchResult};

/// Binds `bind` (`[server].bind`) and serves `ctx` until the process exits.
pub async fn run_server(ctx: AppContext, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await?;

    Ok(())
}

/// Routes with permissive CORS, bound to `ctx`.
pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/collections", get(handle_collections))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<LibraryError> for AppError {
    fn from(err: LibraryError) -> Self {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "library_error",
            message: err.to_string(),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidPattern(_) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "invalid_pattern",
                message: err.to_string(),
            },
            SearchError::Library(e) => e.into(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /collections ============

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<Collection>,
}

async fn handle_collections(
    State(ctx): State<AppContext>,
) -> Result<Json<CollectionsResponse>, AppError> {
    let collections = ctx.library.collections().await?;
    Ok(Json(CollectionsResponse { collections }))
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    /// Comma-separated groupings: collection keys and `tag:<name>`.
    groups: String,
    q: String,
    #[serde(default)]
    ignore_case: bool,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let groupings = params
        .groups
        .split(',')
        .filter(|g| !g.trim().is_empty())
        .map(str::parse::<Grouping>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| bad_request(e.to_string()))?;
    if groupings.is_empty() {
        return Err(bad_request("groups must name at least one collection or tag"));
    }

    let results = ctx
        .engine
        .search_library(&ctx.library, &groupings, &params.q, params.ignore_case)
        .await?;
    Ok(Json(SearchResponse { results }))
}
