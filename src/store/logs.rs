use std::collections::BTreeMap;

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_utc, parse_utc, partition_month, StoreError};
use crate::types::{DeliveryErrorKind, HookTrigger, WebHookLog};

/// Append-only delivery history, partitioned by month of `created_at`.
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, log: &WebHookLog) -> Result<(), StoreError> {
        let request_headers = serde_json::to_string(&log.request_headers)
            .map_err(|err| StoreError::Parse(format!("invalid request headers JSON: {err}")))?;
        let request_data = serde_json::to_string(&log.request_data)
            .map_err(|err| StoreError::Parse(format!("invalid request data JSON: {err}")))?;
        let response_headers = serde_json::to_string(&log.response_headers)
            .map_err(|err| StoreError::Parse(format!("invalid response headers JSON: {err}")))?;

        sqlx::query(
            r#"
            INSERT INTO web_hook_logs (
                id, endpoint_id, partition_month, hook_trigger, url,
                request_headers, request_data, response_status, response_headers,
                response_body, execution_duration, error_kind, internal_error_message,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.endpoint_id.to_string())
        .bind(partition_month(log.created_at))
        .bind(log.trigger.as_str())
        .bind(&log.url)
        .bind(request_headers)
        .bind(request_data)
        .bind(log.response_status.map(i64::from))
        .bind(response_headers)
        .bind(&log.response_body)
        .bind(log.execution_duration)
        .bind(log.error_kind.map(|kind| kind.as_str()))
        .bind(&log.internal_error_message)
        .bind(format_utc(log.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest first.
    pub async fn recent(&self, endpoint_id: Uuid, limit: i64) -> Result<Vec<WebHookLog>, StoreError> {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT
                id, endpoint_id, hook_trigger, url, request_headers, request_data,
                response_status, response_headers, response_body, execution_duration,
                error_kind, internal_error_message, created_at
            FROM web_hook_logs
            WHERE endpoint_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(endpoint_id.to_string())
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WebHookLog::try_from).collect()
    }

    /// The most recent entry that did not end in a 2xx response.
    pub async fn last_failure(&self, endpoint_id: Uuid) -> Result<Option<WebHookLog>, StoreError> {
        let row = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT
                id, endpoint_id, hook_trigger, url, request_headers, request_data,
                response_status, response_headers, response_body, execution_duration,
                error_kind, internal_error_message, created_at
            FROM web_hook_logs
            WHERE endpoint_id = ?
              AND (
                error_kind IS NOT NULL
                OR response_status IS NULL
                OR response_status NOT BETWEEN 200 AND 299
              )
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(endpoint_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WebHookLog::try_from).transpose()
    }

    pub async fn count(&self, endpoint_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM web_hook_logs WHERE endpoint_id = ?")
            .bind(endpoint_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes up to `batch_size` entries for an endpoint. Returns `true` when
    /// a full batch went and entries remain, so callers loop until `false`.
    pub async fn delete_batch(&self, endpoint_id: Uuid, batch_size: i64) -> Result<bool, StoreError> {
        let batch_size = batch_size.max(1);
        let endpoint_id = endpoint_id.to_string();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM web_hook_logs
            WHERE rowid IN (
                SELECT rowid FROM web_hook_logs
                WHERE endpoint_id = ?
                LIMIT ?
            )
            "#,
        )
        .bind(&endpoint_id)
        .bind(batch_size)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let remaining: bool = if deleted == batch_size.unsigned_abs() {
            sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM web_hook_logs WHERE endpoint_id = ?)",
            )
            .bind(&endpoint_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            false
        };

        tx.commit().await?;
        Ok(remaining)
    }

    /// Drops up to `batch_size` entries from partitions older than `cutoff`
    /// (a `YYYY-MM` month). Returns how many went.
    pub async fn purge_partitions_before(&self, cutoff: &str, batch_size: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM web_hook_logs
            WHERE rowid IN (
                SELECT rowid FROM web_hook_logs
                WHERE partition_month < ?
                LIMIT ?
            )
            "#,
        )
        .bind(cutoff)
        .bind(batch_size.max(1))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: String,
    endpoint_id: String,
    hook_trigger: String,
    url: String,
    request_headers: String,
    request_data: String,
    response_status: Option<i64>,
    response_headers: String,
    response_body: String,
    execution_duration: f64,
    error_kind: Option<String>,
    internal_error_message: Option<String>,
    created_at: String,
}

impl TryFrom<LogRow> for WebHookLog {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let request_headers: BTreeMap<String, String> = serde_json::from_str(&row.request_headers)
            .map_err(|err| StoreError::Parse(format!("invalid request headers JSON: {err}")))?;
        let response_headers: BTreeMap<String, String> =
            serde_json::from_str(&row.response_headers).map_err(|err| {
                StoreError::Parse(format!("invalid response headers JSON: {err}"))
            })?;
        let request_data = serde_json::from_str(&row.request_data)
            .map_err(|err| StoreError::Parse(format!("invalid request data JSON: {err}")))?;
        let response_status = row
            .response_status
            .map(|status| {
                u16::try_from(status)
                    .map_err(|_| StoreError::Parse(format!("invalid response status: {status}")))
            })
            .transpose()?;
        let error_kind = row
            .error_kind
            .as_deref()
            .map(|kind| {
                DeliveryErrorKind::parse(kind)
                    .ok_or_else(|| StoreError::Parse(format!("unknown error kind: {kind}")))
            })
            .transpose()?;

        Ok(WebHookLog {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid log id: {err}")))?,
            endpoint_id: Uuid::parse_str(&row.endpoint_id)
                .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
            trigger: HookTrigger::parse(&row.hook_trigger).ok_or_else(|| {
                StoreError::Parse(format!("unknown trigger: {}", row.hook_trigger))
            })?,
            url: row.url,
            request_headers,
            request_data,
            response_status,
            response_headers,
            response_body: row.response_body,
            execution_duration: row.execution_duration,
            error_kind,
            internal_error_message: row.internal_error_message,
            created_at: parse_utc("created_at", &row.created_at)?,
        })
    }
}
