//! Session endpoints and the SSE event feed.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use deckforge_core::models::{ColorScheme, GenerationRequest, Style};
use deckforge_core::PipelineError;
use futures::stream::{self, Stream};

use super::{ApiError, ApiResponse, GenerateBody, SharedState, StateResponse};

/// Parse a lowercase wire name into a core enum
pub fn parse_choice<T: serde::de::DeserializeOwned>(field: &str, value: &str) -> Result<T, PipelineError> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .map_err(|_| PipelineError::Validation(format!("unknown {field} '{value}'")))
}

impl GenerateBody {
    pub fn into_request(self) -> Result<GenerationRequest, PipelineError> {
        let mut request = GenerationRequest::new(self.subject);
        if let Some(style) = self.style {
            request = request.with_style(parse_choice::<Style>("style", &style)?);
        }
        if let Some(scheme) = self.color_scheme {
            request = request.with_color_scheme(parse_choice::<ColorScheme>("color scheme", &scheme)?);
        }
        if let Some(hint) = self.section_count_hint {
            request = request.with_section_count_hint(hint);
        }
        request.validate()?;
        Ok(request)
    }
}

/// Start a generation session
#[utoipa::path(
    post,
    path = "/api/v1/generate",
    tag = "pipeline",
    request_body = GenerateBody,
    responses(
        (status = 202, description = "Session started", body = ApiResponse),
        (status = 400, description = "Invalid request", body = ApiResponse),
        (status = 403, description = "Request not authorized", body = ApiResponse),
        (status = 409, description = "A session is already running", body = ApiResponse)
    )
)]
pub async fn generate(
    State(state): State<SharedState>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    let request = body.into_request()?;
    let ticket = state.coordinator.begin(request).await?;

    tracing::info!(token = ticket.token(), "starting generation");
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.drive(ticket).await {
            tracing::warn!(error = %e, "generation ended with error");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok("generation started"))))
}

/// Discard the current session
#[utoipa::path(
    post,
    path = "/api/v1/reset",
    tag = "pipeline",
    responses(
        (status = 200, description = "Pipeline reset", body = ApiResponse)
    )
)]
pub async fn reset(State(state): State<SharedState>) -> Json<ApiResponse> {
    state.coordinator.reset().await;
    Json(ApiResponse::ok("pipeline reset"))
}

/// Reset and replay the last request
#[utoipa::path(
    post,
    path = "/api/v1/retry",
    tag = "pipeline",
    responses(
        (status = 202, description = "Retry started", body = ApiResponse),
        (status = 409, description = "Nothing to retry or a session is running", body = ApiResponse)
    )
)]
pub async fn retry(
    State(state): State<SharedState>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    let ticket = state.coordinator.begin_retry().await?;

    tracing::info!(token = ticket.token(), "retrying last request");
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.drive(ticket).await {
            tracing::warn!(error = %e, "retry ended with error");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok("retry started"))))
}

/// Current pipeline state
#[utoipa::path(
    get,
    path = "/api/v1/state",
    tag = "pipeline",
    responses(
        (status = 200, description = "Current pipeline state", body = StateResponse)
    )
)]
pub async fn get_state(State(state): State<SharedState>) -> Json<StateResponse> {
    Json(state.coordinator.snapshot().await.into())
}

/// SSE endpoint for pipeline events with heartbeat
pub async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match tokio::time::timeout(Duration::from_secs(15), rx.recv()).await {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().event(super::enum_name(&event.kind)).data(json)), rx));
                }
                Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                    continue;
                }
                Ok(Err(_)) => return None,
                Err(_) => return Some((Ok(Event::default().comment("heartbeat")), rx)),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
