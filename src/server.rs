use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::apis::SourceId;
use crate::pipeline::{ResearchError, ResearchPipeline, ResearchQuery, ResearchResult};

const SERVICE_NAME: &str = "Virtual Research Assistant API";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DESCRIPTION: &str = "A research assistant that fetches and analyzes research papers from multiple sources";
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared handler state. A pipeline that failed to build stays failed for
/// the lifetime of the process and every research request reports why.
#[derive(Clone)]
pub struct AppState {
    pipeline: Result<Arc<ResearchPipeline>, ResearchError>,
}

impl AppState {
    pub fn new(pipeline: Result<Arc<ResearchPipeline>, ResearchError>) -> Self {
        Self { pipeline }
    }
}

impl IntoResponse for ResearchError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ResearchError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
            ResearchError::Unconfigured(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            ResearchError::NoResults { .. } => (StatusCode::NOT_FOUND, "not_found"),
            ResearchError::Unexpected(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = json!({
            "error": error,
            "detail": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api", get(api_root))
        .route("/api/api-info", get(api_info))
        .route("/api/health", get(health))
        .route("/api/health/status", get(health_status))
        .route("/api/research", post(research))
        .route("/api/research/sources", get(sources))
        // Unprefixed aliases
        .route("/health", get(health))
        .route("/health/status", get(health_status))
        .route("/research", post(research))
        .route("/research/sources", get(sources))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn research(
    State(state): State<AppState>,
    Json(query): Json<ResearchQuery>,
) -> Result<Json<ResearchResult>, ResearchError> {
    let pipeline = state.pipeline.clone()?;
    let result = pipeline.spawn_run(query).await?;
    Ok(Json(result))
}

async fn sources() -> Json<Value> {
    let names: Vec<&str> = SourceId::ALL.iter().map(|s| s.display_name()).collect();
    Json(json!({
        "available_sources": names,
        "description": "Research paper sources that can be used for queries",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "message": "API is running" }))
}

async fn health_status() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "API is running",
        "version": VERSION,
        "service": SERVICE_NAME,
    }))
}

async fn api_root() -> Json<Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "version": VERSION,
        "description": DESCRIPTION,
        "endpoints": {
            "/research": "POST - Search and analyze research papers",
            "/research/sources": "GET - Get available data sources",
            "/health": "GET - Health check endpoint",
            "/health/status": "GET - Detailed health check",
            "/": "GET - Web interface",
        },
    }))
}

async fn api_info() -> Json<Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "version": VERSION,
        "description": DESCRIPTION,
        "features": [
            "Search research papers from ArXiv",
            "Search research papers from Google Scholar",
            "AI-powered paper summarization",
            "Advantages and disadvantages analysis",
            "Multiple data source support",
        ],
    }))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
