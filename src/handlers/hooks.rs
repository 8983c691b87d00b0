use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::{
    error::ApiError,
    extractors::{HookId, ValidJson, ValidQuery},
    hooks::url_policy::strip_credentials,
    state::AppState,
    types::{
        CreateEndpointResponse, Endpoint, EndpointSummary, ExecuteHookRequest,
        ExecuteHookResponse, ExecuteOutcome, NewEndpoint, RecentLogsResponse, TestHookRequest,
        TestHookResponse, WebHookLog,
    },
};

const DEFAULT_LOG_LIMIT: i64 = 20;
const MAX_LOG_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct RecentLogsQuery {
    limit: Option<i64>,
}

pub async fn create_hook_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<NewEndpoint>,
) -> Result<(StatusCode, Json<CreateEndpointResponse>), ApiError> {
    let endpoint = state.dispatcher.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateEndpointResponse {
            endpoint: summarize(&endpoint, None),
        }),
    ))
}

pub async fn get_hook_handler(
    State(state): State<AppState>,
    HookId(id): HookId,
) -> Result<Json<EndpointSummary>, ApiError> {
    let endpoint = load(&state, id).await?;
    let last_failure = state.dispatcher.logs().last_failure(id).await?;
    Ok(Json(summarize(&endpoint, last_failure)))
}

pub async fn delete_hook_handler(
    State(state): State<AppState>,
    HookId(id): HookId,
) -> Result<StatusCode, ApiError> {
    if state.dispatcher.remove(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("hook not found"))
    }
}

/// Clears a backoff or permanent disable.
pub async fn enable_hook_handler(
    State(state): State<AppState>,
    HookId(id): HookId,
) -> Result<Json<EndpointSummary>, ApiError> {
    let endpoint = state.dispatcher.endpoints().enable(id).await?;
    let last_failure = state.dispatcher.logs().last_failure(id).await?;
    Ok(Json(summarize(&endpoint, last_failure)))
}

pub async fn test_hook_handler(
    State(state): State<AppState>,
    HookId(id): HookId,
    ValidJson(req): ValidJson<TestHookRequest>,
) -> Result<Json<TestHookResponse>, ApiError> {
    let endpoint = load(&state, id).await?;
    let outcome = state
        .dispatcher
        .test(&endpoint, req.trigger, req.payload)
        .await?;
    Ok(Json(TestHookResponse { outcome }))
}

pub async fn execute_hook_handler(
    State(state): State<AppState>,
    HookId(id): HookId,
    ValidJson(req): ValidJson<ExecuteHookRequest>,
) -> Result<(StatusCode, Json<ExecuteHookResponse>), ApiError> {
    let endpoint = load(&state, id).await?;
    let result = state
        .dispatcher
        .execute(
            &endpoint,
            req.trigger,
            req.payload,
            req.mode.unwrap_or_default(),
            req.force.unwrap_or(false),
        )
        .await?;

    let status = match result {
        ExecuteOutcome::Enqueued { .. } => StatusCode::ACCEPTED,
        ExecuteOutcome::Completed { .. } => StatusCode::OK,
    };
    Ok((status, Json(ExecuteHookResponse { result })))
}

pub async fn recent_logs_handler(
    State(state): State<AppState>,
    HookId(id): HookId,
    ValidQuery(query): ValidQuery<RecentLogsQuery>,
) -> Result<Json<RecentLogsResponse>, ApiError> {
    let limit = parse_limit(query.limit)?;
    load(&state, id).await?;
    let logs = state.dispatcher.logs().recent(id, limit).await?;
    Ok(Json(RecentLogsResponse { logs }))
}

async fn load(state: &AppState, id: uuid::Uuid) -> Result<Endpoint, ApiError> {
    state
        .dispatcher
        .endpoints()
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("hook not found"))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    match limit {
        None => Ok(DEFAULT_LOG_LIMIT),
        Some(value) if (1..=MAX_LOG_LIMIT).contains(&value) => Ok(value),
        Some(_) => Err(ApiError::validation(format!(
            "limit must be between 1 and {MAX_LOG_LIMIT}"
        ))),
    }
}

/// Secret-free view of an endpoint.
pub fn summarize(endpoint: &Endpoint, last_failure: Option<WebHookLog>) -> EndpointSummary {
    EndpointSummary {
        id: endpoint.id,
        url: strip_credentials(&endpoint.url),
        url_variable_names: endpoint.url_variables.keys().cloned().collect(),
        has_token: endpoint.token.is_some(),
        rate_limit: endpoint.rate_limit,
        events: endpoint.events.clone(),
        branch_filter_strategy: endpoint.branch_filter_strategy,
        push_events_branch_filter: endpoint.push_events_branch_filter.clone(),
        enable_ssl_verification: endpoint.enable_ssl_verification,
        disabled: endpoint.disabled,
        recent_failures: endpoint.recent_failures,
        backoff_count: endpoint.backoff_count,
        last_failure,
    }
}
