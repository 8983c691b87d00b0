//! Background purge of Log Store partitions that fell out of the retention
//! window. Runs off the delivery path and is safe to repeat.

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::store::{LogStore, StoreError};

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const PURGE_BATCH_SIZE: i64 = 5000;

/// Oldest partition still kept when `retention_months` months are retained,
/// counting the current one.
pub fn oldest_kept_partition(now: DateTime<Utc>, retention_months: u32) -> String {
    let current = i64::from(now.year()) * 12 + i64::from(now.month0());
    let oldest = current - i64::from(retention_months.max(1)) + 1;
    format!("{:04}-{:02}", oldest.div_euclid(12), oldest.rem_euclid(12) + 1)
}

/// Deletes every entry in expired partitions, a batch at a time.
pub async fn purge_expired(
    logs: &LogStore,
    now: DateTime<Utc>,
    retention_months: u32,
) -> Result<u64, StoreError> {
    let cutoff = oldest_kept_partition(now, retention_months);
    let mut total = 0;
    loop {
        let deleted = logs.purge_partitions_before(&cutoff, PURGE_BATCH_SIZE).await?;
        total += deleted;
        if deleted < PURGE_BATCH_SIZE.unsigned_abs() {
            return Ok(total);
        }
    }
}

pub fn spawn_sweeper(logs: LogStore, retention_months: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match purge_expired(&logs, Utc::now(), retention_months).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, retention_months, "purged expired hook logs"),
                Err(err) => error!(error = %err, "hook log retention sweep failed"),
            }
        }
    })
}
