//! Persisted settings. Changes apply to the next server start.

use axum::response::Json;

use crate::settings::DeckforgeSettings;

/// Get persisted settings
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Persisted settings", body = DeckforgeSettings)
    )
)]
pub async fn get_config() -> Json<DeckforgeSettings> {
    Json(DeckforgeSettings::load().await)
}

/// Update persisted settings (partial merge)
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body = DeckforgeSettings,
    responses(
        (status = 200, description = "Updated settings", body = DeckforgeSettings)
    )
)]
pub async fn update_config(Json(updates): Json<DeckforgeSettings>) -> Json<DeckforgeSettings> {
    let mut settings = DeckforgeSettings::load().await;
    settings.merge(updates);

    if let Err(e) = settings.save().await {
        tracing::error!(error = %e, "failed to save settings");
    }

    Json(settings)
}
