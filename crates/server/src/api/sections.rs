//! Per-section edits addressed by index.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use deckforge_core::PipelineError;

use super::{ApiError, ApiResponse, SharedState, UpdateSectionBody};

/// Replace a section's content
#[utoipa::path(
    put,
    path = "/api/v1/sections/{index}",
    tag = "sections",
    params(("index" = usize, Path, description = "Zero-based section index")),
    request_body = UpdateSectionBody,
    responses(
        (status = 200, description = "Section updated", body = ApiResponse),
        (status = 404, description = "No such section", body = ApiResponse),
        (status = 409, description = "Section is still generating", body = ApiResponse)
    )
)]
pub async fn update_section(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
    Json(body): Json<UpdateSectionBody>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .coordinator
        .update_section_content(index, body.content)
        .await?;
    Ok(Json(ApiResponse::ok(format!("section {index} updated"))))
}

/// Generate one section again with the last request
#[utoipa::path(
    post,
    path = "/api/v1/sections/{index}/regenerate",
    tag = "sections",
    params(("index" = usize, Path, description = "Zero-based section index")),
    responses(
        (status = 202, description = "Regeneration started", body = ApiResponse),
        (status = 404, description = "No such section", body = ApiResponse),
        (status = 409, description = "Section not dispatched yet or no request", body = ApiResponse)
    )
)]
pub async fn regenerate_section(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    let request = state
        .coordinator
        .last_request()
        .await
        .ok_or(PipelineError::NothingToRetry)?;
    state.coordinator.regenerate_chapter(index, request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(format!("section {index} regenerating"))),
    ))
}

/// Remove a section; later sections move down by one
#[utoipa::path(
    delete,
    path = "/api/v1/sections/{index}",
    tag = "sections",
    params(("index" = usize, Path, description = "Zero-based section index")),
    responses(
        (status = 200, description = "Section deleted", body = ApiResponse),
        (status = 404, description = "No such section", body = ApiResponse),
        (status = 409, description = "Outline still streaming or section generating", body = ApiResponse)
    )
)]
pub async fn delete_section(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
) -> Result<Json<ApiResponse>, ApiError> {
    state.coordinator.delete_chapter(index).await?;
    Ok(Json(ApiResponse::ok(format!("section {index} deleted"))))
}
