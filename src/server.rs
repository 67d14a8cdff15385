//! HTTP server.
//!
//! Serves the loaded snapshot read-only. The [`Engine`] is shared between
//! handlers as an `Arc` with no locking; every request builds its own
//! query-local state.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, chunk and edge counts |
//! | `POST` | `/retrieve` | Gap-filled retrieval for `{ query, plan }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "min_docs: must be at least 1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use notegraph_core::engine::Engine;
use notegraph_core::models::Category;
use notegraph_core::plan::{Difficulty, QueryPlan, QueryType, YearFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::query::{load_engine, EvidenceReport};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    embedder: Arc<dyn Embedder>,
    query_timeout: Duration,
}

/// Load the snapshot and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = load_engine(config).await?;
    let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_provider(&config.embedding)?);

    let state = AppState {
        engine: Arc::new(engine),
        embedder,
        query_timeout: Duration::from_millis(config.server.query_timeout_ms),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, chunks = state.engine.store().len(), "server listening");
    println!("notegraph server listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/retrieve", post(handle_retrieve))
        .layer(cors)
        .with_state(state)
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

fn embedding_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "embedding_error",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<notegraph_core::Error> for AppError {
    fn from(err: notegraph_core::Error) -> Self {
        match err {
            notegraph_core::Error::Validation { .. } => bad_request(err.to_string()),
            other => internal(other.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    chunks: usize,
    edges: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        chunks: state.engine.store().len(),
        edges: state.engine.graph().edge_count(),
    })
}

// ============ POST /retrieve ============

#[derive(Debug, Deserialize)]
struct RetrieveRequest {
    query: String,
    plan: PlanRequest,
}

/// Wire form of a plan. Bounds default from the type/difficulty table.
#[derive(Debug, Deserialize)]
struct PlanRequest {
    query_type: QueryType,
    difficulty: Difficulty,
    #[serde(default)]
    min_docs: Option<usize>,
    #[serde(default)]
    max_docs: Option<usize>,
    #[serde(default)]
    year_filter: Option<YearFilter>,
    #[serde(default)]
    category_filter: Option<Category>,
    #[serde(default)]
    expected_categories: Vec<Category>,
    #[serde(default)]
    expanded_terms: Vec<String>,
    #[serde(default)]
    year_window: Option<u32>,
}

impl PlanRequest {
    fn into_plan(self) -> QueryPlan {
        let mut plan = QueryPlan::new(self.query_type, self.difficulty);
        let min_docs = self.min_docs.unwrap_or(plan.min_docs);
        let max_docs = self.max_docs.unwrap_or(plan.max_docs);
        plan = plan.with_bounds(min_docs, max_docs).with_terms(self.expanded_terms);
        plan.year_filter = self.year_filter;
        plan.category_filter = self.category_filter;
        for category in self.expected_categories {
            plan = plan.expect_category(category);
        }
        plan.year_window = self.year_window;
        plan
    }
}

async fn handle_retrieve(
    State(state): State<AppState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let deadline = Instant::now() + state.query_timeout;

    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let plan = request.plan.into_plan();
    plan.validate()?;

    let query_vector = embedding::embed_query(state.embedder.as_ref(), &request.query)
        .await
        .map_err(|e| {
            warn!(error = %e, "query embedding failed");
            embedding_error(e.to_string())
        })?;

    let engine = state.engine.clone();
    let query = request.query;
    let body = tokio::task::spawn_blocking(move || {
        let evidence = engine.evidence(&plan, &query, &query_vector, Some(deadline))?;
        let report = EvidenceReport {
            query: &query,
            plan: &plan,
            evidence: &evidence,
        };
        serde_json::to_value(&report).map_err(|e| internal(e.to_string()))
    })
    .await
    .map_err(|e| internal(format!("retrieval task failed: {}", e)))??;

    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_request_defaults_bounds() {
        let request: PlanRequest = serde_json::from_value(serde_json::json!({
            "query_type": "comparison",
            "difficulty": "easy",
            "year_filter": { "kind": "exact", "year": 2021 },
            "expected_categories": ["work", "work", "health"]
        }))
        .unwrap();
        let plan = request.into_plan();
        assert_eq!((plan.min_docs, plan.max_docs), (6, 12));
        assert_eq!(plan.year_filter, Some(YearFilter::Exact { year: 2021 }));
        assert_eq!(plan.expected_categories, vec![Category::Work, Category::Health]);
    }

    #[test]
    fn test_plan_request_bound_override_validated() {
        let request: PlanRequest = serde_json::from_value(serde_json::json!({
            "query_type": "specific",
            "difficulty": "easy",
            "min_docs": 0
        }))
        .unwrap();
        assert!(request.into_plan().validate().is_err());
    }

    #[test]
    fn test_unknown_category_rejected_at_parse() {
        let result: Result<PlanRequest, _> = serde_json::from_value(serde_json::json!({
            "query_type": "specific",
            "difficulty": "easy",
            "category_filter": "astrology"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err: AppError =
            notegraph_core::Error::validation("min_docs", "must be at least 1").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
        let err: AppError = notegraph_core::Error::Config {
            message: "x".to_string(),
        }
        .into();
        assert_eq!(err.code, "internal");
    }
}
