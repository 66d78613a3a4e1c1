//! # HTTP API
//!
//! Axum routes over one shared [`Coordinator`]. Long-running operations are
//! spawned and acknowledged with `202 Accepted`; clients follow progress on
//! `/api/v1/events` or poll `/api/v1/state`.

pub mod config;
pub mod pipeline;
pub mod sections;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use deckforge_core::pipeline::{Coordinator, PipelineEvent, PipelineSnapshot, Section};
use deckforge_core::PipelineError;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::{OpenApi, ToSchema};

use crate::settings::DeckforgeSettings;

/// Application state
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub event_tx: broadcast::Sender<PipelineEvent>,
}

pub type SharedState = Arc<AppState>;

// === API Types ===

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateBody {
    pub subject: String,
    /// business, academic, creative, minimal or technical
    pub style: Option<String>,
    /// blue, green, purple, dark or light
    pub color_scheme: Option<String>,
    pub section_count_hint: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSectionBody {
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SectionView {
    pub index: usize,
    /// pending, dispatched, ready or failed
    pub status: String,
    /// Artifact, placeholder or error message depending on status
    pub value: String,
    pub source_text: String,
}

impl From<&Section> for SectionView {
    fn from(section: &Section) -> Self {
        Self {
            index: section.index,
            status: enum_name(&section.status),
            value: section.display_value().to_string(),
            source_text: section.source_text.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StateResponse {
    pub token: u64,
    pub is_generating: bool,
    pub progress: f64,
    /// idle, connecting, generating, completing or error
    pub stage: String,
    pub sections: Vec<SectionView>,
    pub error_message: Option<String>,
}

impl From<PipelineSnapshot> for StateResponse {
    fn from(snapshot: PipelineSnapshot) -> Self {
        Self {
            token: snapshot.token,
            is_generating: snapshot.is_generating,
            progress: snapshot.progress,
            stage: enum_name(&snapshot.stage),
            sections: snapshot.sections.iter().map(SectionView::from).collect(),
            error_message: snapshot.error_message,
        }
    }
}

/// Serialized name of a unit enum variant
fn enum_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}

/// Pipeline error rendered as an [`ApiResponse`]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Unauthorized(_) => StatusCode::FORBIDDEN,
            PipelineError::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
            PipelineError::InvalidState { .. }
            | PipelineError::Busy { .. }
            | PipelineError::NothingToRetry
            | PipelineError::SessionDiscarded => StatusCode::CONFLICT,
            PipelineError::Connection { .. }
            | PipelineError::Upstream { .. }
            | PipelineError::StreamProtocol(_)
            | PipelineError::NoSections => StatusCode::BAD_GATEWAY,
            PipelineError::Credentials(_) | PipelineError::TaskFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ApiResponse {
            success: false,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Deckforge API",
        version = "1.0.0",
        description = "Streaming outline-to-section document generation"
    ),
    paths(
        pipeline::generate,
        pipeline::reset,
        pipeline::retry,
        pipeline::get_state,
        sections::update_section,
        sections::regenerate_section,
        sections::delete_section,
        config::get_config,
        config::update_config
    ),
    components(schemas(
        ApiResponse,
        GenerateBody,
        UpdateSectionBody,
        SectionView,
        StateResponse,
        DeckforgeSettings
    )),
    tags(
        (name = "pipeline", description = "Generation sessions"),
        (name = "sections", description = "Per-section edits"),
        (name = "config", description = "Persisted settings")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    let doc = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(doc))
        .unwrap_or_default()
}

pub fn router(state: SharedState) -> Router {
    let pipeline_routes = Router::new()
        .route("/generate", post(pipeline::generate))
        .route("/reset", post(pipeline::reset))
        .route("/retry", post(pipeline::retry))
        .route("/state", get(pipeline::get_state))
        .route("/events", get(pipeline::events));

    let section_routes = Router::new()
        .route(
            "/:index",
            put(sections::update_section).delete(sections::delete_section),
        )
        .route("/:index/regenerate", post(sections::regenerate_section));

    Router::new()
        .nest("/api/v1", pipeline_routes)
        .nest("/api/v1/sections", section_routes)
        .route(
            "/api/v1/config",
            get(config::get_config).patch(config::update_config),
        )
        .route("/api/openapi.json", get(serve_openapi))
        .with_state(state)
}
