use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

use super::HookTrigger;

/// One recorded delivery attempt. Never mutated after it is appended.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct WebHookLog {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub trigger: HookTrigger,
    /// Endpoint URL template with userinfo credentials removed.
    pub url: String,

    pub request_headers: BTreeMap<String, String>,
    /// Redacted payload, or the oversize sentinel.
    pub request_data: serde_json::Value,

    /// `None` when no HTTP response was received.
    pub response_status: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,

    /// Seconds.
    pub execution_duration: f64,
    pub error_kind: Option<DeliveryErrorKind>,
    pub internal_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebHookLog {
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
            && self
                .response_status
                .is_some_and(|status| (200..300).contains(&status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    Timeout,
    /// Connection, DNS or TLS failure.
    Network,
    /// Failure on our side before or after the request (oversize body,
    /// blocked address, unreadable response).
    Internal,
}

impl DeliveryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryErrorKind::Timeout => "timeout",
            DeliveryErrorKind::Network => "network",
            DeliveryErrorKind::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "timeout" => Some(DeliveryErrorKind::Timeout),
            "network" => Some(DeliveryErrorKind::Network),
            "internal" => Some(DeliveryErrorKind::Internal),
            _ => None,
        }
    }
}
