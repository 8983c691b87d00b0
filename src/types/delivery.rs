use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

use super::{DeliveryErrorKind, DisabledState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Sync,
    #[default]
    Async,
}

/// Result of running the delivery pipeline once for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success {
        http_status: u16,
        message: String,
        log_id: Option<Uuid>,
    },
    Failure {
        failure: DeliveryFailure,
        message: String,
        log_id: Option<Uuid>,
    },
    /// Skipped: the endpoint's rate limit is exhausted for this window.
    RateLimited,
    /// Skipped: the endpoint is backing off or permanently disabled.
    Disabled { state: DisabledState },
    /// Skipped: the hook already fired in this event's call chain, or the
    /// chain is too long.
    RecursionBlocked,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DeliveryOutcome::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::RateLimited
                | DeliveryOutcome::Disabled { .. }
                | DeliveryOutcome::RecursionBlocked
        )
    }

    pub fn log_id(&self) -> Option<Uuid> {
        match self {
            DeliveryOutcome::Success { log_id, .. } | DeliveryOutcome::Failure { log_id, .. } => {
                *log_id
            }
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DeliveryOutcome::Success { message, .. } | DeliveryOutcome::Failure { message, .. } => {
                message
            }
            DeliveryOutcome::RateLimited => "Webhook rate limit exceeded",
            DeliveryOutcome::Disabled { .. } => "Hook disabled",
            DeliveryOutcome::RecursionBlocked => "Recursive webhook blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// The endpoint answered with a non-2xx status.
    HttpStatus { status: u16 },
    Timeout,
    InternalError { kind: DeliveryErrorKind },
}

/// What `execute` did with a delivery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExecuteOutcome {
    /// Handed to the worker pool; delivery happens out of band.
    Enqueued { job_id: Uuid },
    Completed { outcome: DeliveryOutcome },
}
