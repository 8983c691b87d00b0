use axum::{Json, extract::State, http::StatusCode};

use crate::{
    error::ApiError,
    extractors::ValidJson,
    state::AppState,
    types::{DispatchEventResponse, HookEventRequest},
};

/// Producer entry point: queues the event for every subscribed hook.
pub async fn dispatch_event_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<HookEventRequest>,
) -> Result<(StatusCode, Json<DispatchEventResponse>), ApiError> {
    let branch = match req.branch.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::validation("branch must be non-empty")),
        other => other,
    };

    let response = state
        .dispatcher
        .dispatch_event(req.trigger, req.payload, branch, req.event_uuid)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}
