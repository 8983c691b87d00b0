use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::config::{MAX_QUEUE_CAPACITY, MAX_WORKERS};
use super::pipeline::Pipeline;
use crate::types::HookTrigger;

/// One async delivery waiting for a worker.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub trigger: HookTrigger,
    pub payload: Value,
    pub force: bool,
    /// Call chain this delivery belongs to; sent as `X-Hook-Event-UUID`.
    pub event_uuid: Uuid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("delivery queue is full")]
    Full,
    #[error("delivery queue is closed")]
    Closed,
}

/// Fire-and-forget hand-off. Implementations must not wait on the network.
pub trait JobQueue: Send + Sync {
    /// Claims room for one job. Dropping the slot unused gives the room back.
    fn reserve(&self) -> Result<Box<dyn QueueSlot + Send + '_>, QueueError>;

    fn enqueue(&self, job: DeliveryJob) -> Result<(), QueueError> {
        self.reserve()?.send(job);
        Ok(())
    }
}

/// Room for one job, claimed by [`JobQueue::reserve`].
pub trait QueueSlot {
    fn send(self: Box<Self>, job: DeliveryJob);
}

impl QueueSlot for mpsc::Permit<'_, DeliveryJob> {
    fn send(self: Box<Self>, job: DeliveryJob) {
        mpsc::Permit::send(*self, job);
    }
}

/// Bounded in-process queue drained by at most `workers` concurrent deliveries.
#[derive(Clone)]
pub struct WorkerPool {
    sender: mpsc::Sender<DeliveryJob>,
}

impl WorkerPool {
    /// Starts the pool. The returned task finishes once every handle to the
    /// pool is dropped and the jobs already queued have been delivered.
    pub fn start(pipeline: Pipeline, workers: usize, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        let handle = tokio::spawn(drain(receiver, pipeline, workers.clamp(1, MAX_WORKERS)));
        (Self { sender }, handle)
    }
}

impl JobQueue for WorkerPool {
    fn reserve(&self) -> Result<Box<dyn QueueSlot + Send + '_>, QueueError> {
        match self.sender.try_reserve() {
            Ok(permit) => Ok(Box::new(permit)),
            Err(mpsc::error::TrySendError::Full(())) => Err(QueueError::Full),
            Err(mpsc::error::TrySendError::Closed(())) => Err(QueueError::Closed),
        }
    }
}

async fn drain(mut receiver: mpsc::Receiver<DeliveryJob>, pipeline: Pipeline, workers: usize) {
    let slots = Arc::new(Semaphore::new(workers));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline.run_job(job).await;
            drop(permit);
        });
    }

    let all = u32::try_from(workers).unwrap_or(u32::MAX);
    let _ = slots.acquire_many(all).await;
}
