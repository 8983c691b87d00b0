use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::queue::DeliveryJob;
use crate::auto_disable::is_eligible;
use crate::delivery::DeliveryExecutor;
use crate::hooks::InterpolationError;
use crate::rate_limit::RateLimiter;
use crate::recursion::{Recursion, RecursionGuard};
use crate::store::EndpointStore;
use crate::types::{DeliveryOutcome, Endpoint, HookTrigger};

/// The per-attempt path: eligibility, recursion, rate limit, delivery.
#[derive(Clone)]
pub struct Pipeline {
    endpoints: EndpointStore,
    executor: DeliveryExecutor,
    rate_limiter: RateLimiter,
    recursion: RecursionGuard,
}

impl Pipeline {
    pub fn new(
        endpoints: EndpointStore,
        executor: DeliveryExecutor,
        rate_limiter: RateLimiter,
        recursion: RecursionGuard,
    ) -> Self {
        Self {
            endpoints,
            executor,
            rate_limiter,
            recursion,
        }
    }

    /// Rejections that cost nothing: a disabled endpoint (unless `force`) or
    /// a hook that would recurse within `event_uuid`'s call chain.
    pub async fn screen(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        force: bool,
        event_uuid: Uuid,
    ) -> Option<DeliveryOutcome> {
        if let Some(rejection) = eligibility(endpoint, trigger, force) {
            return Some(rejection);
        }
        self.recursion_check(endpoint, trigger, event_uuid).await
    }

    /// Charges one unit of the endpoint's rate limit budget.
    pub async fn charge_rate_limit(&self, endpoint: &Endpoint, trigger: HookTrigger) -> Option<DeliveryOutcome> {
        if self.rate_limiter.rate_limited(endpoint).await {
            info!(
                hook_id = %endpoint.id,
                trigger = trigger.as_str(),
                rate_limit = endpoint.rate_limit,
                "Webhook rate limit exceeded"
            );
            return Some(DeliveryOutcome::RateLimited);
        }
        None
    }

    /// Returns the rejection if `endpoint` may not be delivered to right now.
    ///
    /// Consumes one unit of the rate limit budget when the screen passes.
    pub async fn admit(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        force: bool,
        event_uuid: Uuid,
    ) -> Option<DeliveryOutcome> {
        if let Some(rejection) = self.screen(endpoint, trigger, force, event_uuid).await {
            return Some(rejection);
        }
        self.charge_rate_limit(endpoint, trigger).await
    }

    pub async fn run(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        payload: &Value,
        force: bool,
        event_uuid: Uuid,
    ) -> Result<DeliveryOutcome, InterpolationError> {
        if let Some(rejection) = self.admit(endpoint, trigger, force, event_uuid).await {
            return Ok(rejection);
        }
        self.recursion.register(endpoint.id, event_uuid).await;
        self.executor.deliver(endpoint, trigger, payload, event_uuid).await
    }

    /// Worker side of an async delivery. The rate limit was already charged
    /// when the job was enqueued; eligibility and recursion are checked again
    /// because both may have changed while the job waited.
    pub async fn run_job(&self, job: DeliveryJob) {
        let endpoint = match self.endpoints.find(job.endpoint_id).await {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => {
                warn!(hook_id = %job.endpoint_id, job_id = %job.id, "hook removed before delivery");
                return;
            }
            Err(err) => {
                error!(hook_id = %job.endpoint_id, job_id = %job.id, error = %err, "failed to load hook");
                return;
            }
        };

        if self
            .screen(&endpoint, job.trigger, job.force, job.event_uuid)
            .await
            .is_some()
        {
            return;
        }
        self.recursion.register(endpoint.id, job.event_uuid).await;

        match self
            .executor
            .deliver(&endpoint, job.trigger, &job.payload, job.event_uuid)
            .await
        {
            Ok(outcome) => debug!(
                hook_id = %endpoint.id,
                job_id = %job.id,
                trigger = job.trigger.as_str(),
                success = outcome.is_success(),
                "delivery finished"
            ),
            Err(err) => error!(
                hook_id = %endpoint.id,
                job_id = %job.id,
                trigger = job.trigger.as_str(),
                error = %err,
                "delivery aborted"
            ),
        }
    }

    async fn recursion_check(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        event_uuid: Uuid,
    ) -> Option<DeliveryOutcome> {
        let recursion = self.recursion.check(endpoint.id, event_uuid).await?;
        let chain_calls = match recursion {
            Recursion::Repeated => None,
            Recursion::ChainTooLong { calls } => Some(calls),
        };
        error!(
            hook_id = %endpoint.id,
            trigger = trigger.as_str(),
            %event_uuid,
            repeated = chain_calls.is_none(),
            chain_calls,
            "Recursive webhook blocked from executing"
        );
        Some(DeliveryOutcome::RecursionBlocked)
    }
}

fn eligibility(endpoint: &Endpoint, trigger: HookTrigger, force: bool) -> Option<DeliveryOutcome> {
    if force || is_eligible(&endpoint.disabled, Utc::now()) {
        return None;
    }
    info!(
        hook_id = %endpoint.id,
        trigger = trigger.as_str(),
        state = endpoint.disabled.as_str(),
        "Hook disabled, delivery skipped"
    );
    Some(DeliveryOutcome::Disabled {
        state: endpoint.disabled,
    })
}
