//! Dispatch orchestration: turns an execute request into either an inline
//! delivery or a queued job, and fans producer events out to subscribers.

mod config;
mod pipeline;
mod queue;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

pub use config::DispatcherConfig;
pub use pipeline::Pipeline;
pub use queue::{DeliveryJob, JobQueue, QueueError, QueueSlot, WorkerPool};

use crate::delivery::{DeliveryExecutor, HttpTransport};
use crate::hooks::{branch_filter, interpolate, validate_endpoint, InterpolationError, ValidationError};
use crate::rate_limit::RateLimiter;
use crate::recursion::RecursionGuard;
use crate::store::{EndpointStore, LogStore, StoreError};
use crate::types::{
    DeliveryOutcome, DispatchEventResponse, DispatchMode, Endpoint, ExecuteOutcome, HookTrigger,
    NewEndpoint,
};

/// Log entries removed per statement when an endpoint is deleted.
pub const LOG_DELETE_BATCH_SIZE: i64 = 1000;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Dispatcher {
    endpoints: EndpointStore,
    logs: LogStore,
    pipeline: Pipeline,
    queue: Arc<dyn JobQueue>,
    config: Arc<DispatcherConfig>,
}

impl Dispatcher {
    /// Wires the executor and starts the worker pool. The returned task ends
    /// after the last `Dispatcher` clone is dropped and queued jobs are done.
    pub fn start(
        endpoints: EndpointStore,
        logs: LogStore,
        transport: Arc<dyn HttpTransport>,
        rate_limiter: RateLimiter,
        config: DispatcherConfig,
    ) -> (Self, JoinHandle<()>) {
        let config = Arc::new(config);
        let executor =
            DeliveryExecutor::new(transport, endpoints.clone(), logs.clone(), Arc::clone(&config));
        let recursion = RecursionGuard::in_memory(config.recursion_count_limit);
        let pipeline = Pipeline::new(endpoints.clone(), executor, rate_limiter, recursion);
        let (pool, worker) =
            WorkerPool::start(pipeline.clone(), config.workers, config.queue_capacity);

        let dispatcher = Self {
            endpoints,
            logs,
            pipeline,
            queue: Arc::new(pool),
            config,
        };
        (dispatcher, worker)
    }

    /// Like [`Dispatcher::start`] but hands async jobs to `queue`.
    pub fn with_queue(
        endpoints: EndpointStore,
        logs: LogStore,
        pipeline: Pipeline,
        queue: Arc<dyn JobQueue>,
        config: Arc<DispatcherConfig>,
    ) -> Self {
        Self {
            endpoints,
            logs,
            pipeline,
            queue,
            config,
        }
    }

    pub fn endpoints(&self) -> &EndpointStore {
        &self.endpoints
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Validates and stores a new endpoint.
    pub async fn register(&self, new: NewEndpoint) -> Result<Endpoint, DispatchError> {
        let endpoint = Endpoint::from_new(Uuid::new_v4(), new, Utc::now());
        validate_endpoint(&endpoint, self.config.allow_local_requests)?;
        self.endpoints.insert(&endpoint).await?;
        info!(hook_id = %endpoint.id, events = endpoint.events.len(), "hook registered");
        Ok(endpoint)
    }

    /// Runs one delivery for `endpoint` as the start of a new call chain.
    ///
    /// `Sync` returns the delivery outcome. `Async` returns once the job is
    /// queued, or with the rejection if the endpoint is disabled, recursing or
    /// over its rate limit. `force` skips the disabled check, never the rate
    /// limit. A URL template that cannot be interpolated is an error in both
    /// modes.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        payload: Value,
        mode: DispatchMode,
        force: bool,
    ) -> Result<ExecuteOutcome, DispatchError> {
        self.execute_in_chain(endpoint, trigger, payload, mode, force, Uuid::new_v4())
            .await
    }

    /// [`Dispatcher::execute`] within the call chain `event_uuid`.
    pub async fn execute_in_chain(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        payload: Value,
        mode: DispatchMode,
        force: bool,
        event_uuid: Uuid,
    ) -> Result<ExecuteOutcome, DispatchError> {
        interpolate(&endpoint.url, &endpoint.url_variables)?;

        match mode {
            DispatchMode::Sync => {
                let outcome = self
                    .pipeline
                    .run(endpoint, trigger, &payload, force, event_uuid)
                    .await?;
                Ok(ExecuteOutcome::Completed { outcome })
            }
            DispatchMode::Async => {
                if let Some(rejection) = self.pipeline.screen(endpoint, trigger, force, event_uuid).await {
                    return Ok(ExecuteOutcome::Completed { outcome: rejection });
                }

                // Budget is only charged once the job is sure to be queued.
                let slot = self.queue.reserve()?;
                if let Some(rejection) = self.pipeline.charge_rate_limit(endpoint, trigger).await {
                    return Ok(ExecuteOutcome::Completed { outcome: rejection });
                }

                let job = DeliveryJob {
                    id: Uuid::new_v4(),
                    endpoint_id: endpoint.id,
                    trigger,
                    payload,
                    force,
                    event_uuid,
                };
                let job_id = job.id;
                slot.send(job);
                debug!(hook_id = %endpoint.id, %job_id, %event_uuid, trigger = trigger.as_str(), "delivery queued");
                Ok(ExecuteOutcome::Enqueued { job_id })
            }
        }
    }

    /// "Test settings": a synchronous, unforced delivery.
    pub async fn test(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        payload: Value,
    ) -> Result<DeliveryOutcome, DispatchError> {
        interpolate(&endpoint.url, &endpoint.url_variables)?;
        Ok(self
            .pipeline
            .run(endpoint, trigger, &payload, false, Uuid::new_v4())
            .await?)
    }

    /// Queues `payload` for every endpoint subscribed to `trigger` whose
    /// branch filter accepts `branch`.
    ///
    /// `event_uuid` continues the call chain of the delivery that caused this
    /// event; without it the event starts a new chain.
    pub async fn dispatch_event(
        &self,
        trigger: HookTrigger,
        payload: Value,
        branch: Option<&str>,
        event_uuid: Option<Uuid>,
    ) -> Result<DispatchEventResponse, DispatchError> {
        let event_uuid = event_uuid.unwrap_or_else(Uuid::new_v4);
        let mut response = DispatchEventResponse {
            enqueued: Vec::new(),
            skipped: Vec::new(),
        };

        for endpoint in self.endpoints.subscribed_to(trigger).await? {
            if trigger.is_branch_scoped()
                && let Some(branch) = branch
                && !branch_filter::matches_branch(&endpoint, branch)
            {
                response.skipped.push(endpoint.id);
                continue;
            }

            match self
                .execute_in_chain(
                    &endpoint,
                    trigger,
                    payload.clone(),
                    DispatchMode::Async,
                    false,
                    event_uuid,
                )
                .await
            {
                Ok(ExecuteOutcome::Enqueued { .. }) => response.enqueued.push(endpoint.id),
                Ok(ExecuteOutcome::Completed { .. }) => response.skipped.push(endpoint.id),
                Err(err @ DispatchError::Interpolation(_)) => {
                    error!(hook_id = %endpoint.id, trigger = trigger.as_str(), error = %err, "hook URL could not be built");
                    response.skipped.push(endpoint.id);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(response)
    }

    /// Deletes an endpoint, clearing its log history in bounded batches
    /// first. Returns `false` if there was no such endpoint.
    pub async fn remove(&self, id: Uuid) -> Result<bool, DispatchError> {
        while self.logs.delete_batch(id, LOG_DELETE_BATCH_SIZE).await? {}
        Ok(self.endpoints.delete(id).await?)
    }
}
