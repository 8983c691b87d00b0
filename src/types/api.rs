use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

use crate::types::{
    BranchFilterStrategy, DeliveryOutcome, DispatchMode, DisabledState, ExecuteOutcome,
    HookTrigger, WebHookLog,
};

/// Endpoint as shown to the configuration UI. Secrets are never included.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct EndpointSummary {
    pub id: Uuid,
    pub url: String,
    pub url_variable_names: Vec<String>,
    pub has_token: bool,
    pub rate_limit: u32,
    pub events: Vec<HookTrigger>,
    pub branch_filter_strategy: BranchFilterStrategy,
    pub push_events_branch_filter: Option<String>,
    pub enable_ssl_verification: bool,
    pub disabled: DisabledState,
    pub recent_failures: u32,
    pub backoff_count: u32,
    pub last_failure: Option<WebHookLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateEndpointResponse {
    pub endpoint: EndpointSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ExecuteHookRequest {
    pub trigger: HookTrigger,
    pub payload: serde_json::Value,
    pub mode: Option<DispatchMode>,
    pub force: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ExecuteHookResponse {
    pub result: ExecuteOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct TestHookRequest {
    pub trigger: HookTrigger,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct TestHookResponse {
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RecentLogsResponse {
    pub logs: Vec<WebHookLog>,
}

/// An event raised by the producer, fanned out to every subscribed endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct HookEventRequest {
    pub trigger: HookTrigger,
    pub payload: serde_json::Value,
    /// Branch name for push-style events; checked against branch filters.
    pub branch: Option<String>,
    /// The `X-Hook-Event-UUID` of the delivery that caused this event, if any.
    #[serde(default)]
    pub event_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DispatchEventResponse {
    pub enqueued: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
}
