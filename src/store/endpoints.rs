use std::collections::BTreeMap;
use std::sync::Arc;

use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

use super::{format_utc, parse_utc, SecretBox, StoreError};
use crate::auto_disable::TrackerState;
use crate::types::{BranchFilterStrategy, DisabledState, Endpoint, HookTrigger};

/// Endpoint persistence. Secret columns pass through the [`SecretBox`] on
/// every write and read.
#[derive(Clone)]
pub struct EndpointStore {
    pool: SqlitePool,
    secrets: Arc<dyn SecretBox>,
}

impl EndpointStore {
    pub fn new(pool: SqlitePool, secrets: Arc<dyn SecretBox>) -> Self {
        Self { pool, secrets }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert(&self, endpoint: &Endpoint) -> Result<(), StoreError> {
        let url = self.secrets.seal(&endpoint.url)?;
        let variables = serde_json::to_string(&endpoint.url_variables)
            .map_err(|err| StoreError::Parse(format!("invalid url variables: {err}")))?;
        let variables = self.secrets.seal(&variables)?;
        let token = match &endpoint.token {
            Some(token) => Some(self.secrets.seal(token)?),
            None => None,
        };
        let events = serde_json::to_string(&endpoint.events)
            .map_err(|err| StoreError::Parse(format!("invalid events: {err}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO endpoints (
                id, encrypted_url, encrypted_url_variables, encrypted_token,
                rate_limit, events, branch_filter_strategy, push_events_branch_filter,
                enable_ssl_verification, disabled_state, disabled_until,
                recent_failures, backoff_count, lock_version, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(endpoint.id.to_string())
        .bind(url)
        .bind(variables)
        .bind(token)
        .bind(i64::from(endpoint.rate_limit))
        .bind(events)
        .bind(endpoint.branch_filter_strategy.as_str())
        .bind(&endpoint.push_events_branch_filter)
        .bind(endpoint.enable_ssl_verification)
        .bind(endpoint.disabled.as_str())
        .bind(endpoint.disabled.disabled_until().map(format_utc))
        .bind(i64::from(endpoint.recent_failures))
        .bind(i64::from(endpoint.backoff_count))
        .bind(endpoint.lock_version)
        .bind(format_utc(endpoint.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(
                StoreError::Conflict(format!("endpoint {} already exists", endpoint.id)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Endpoint>, StoreError> {
        let row = fetch_row(&self.pool, id).await?;
        row.map(|row| self.decode(row)).transpose()
    }

    pub async fn get(&self, id: Uuid) -> Result<Endpoint, StoreError> {
        self.find(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("endpoint {id} not found")))
    }

    /// Endpoints whose `events` include `trigger`, oldest first.
    pub async fn subscribed_to(&self, trigger: HookTrigger) -> Result<Vec<Endpoint>, StoreError> {
        let needle = format!("\"{}\"", trigger.as_str());
        let rows = sqlx::query_as::<_, EndpointRow>(
            r#"
            SELECT
                id, encrypted_url, encrypted_url_variables, encrypted_token,
                rate_limit, events, branch_filter_strategy, push_events_branch_filter,
                enable_ssl_verification, disabled_state, disabled_until,
                recent_failures, backoff_count, lock_version, created_at
            FROM endpoints
            WHERE instr(events, ?) > 0
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(needle)
        .fetch_all(&self.pool)
        .await?;

        let mut endpoints = Vec::with_capacity(rows.len());
        for row in rows {
            let endpoint = self.decode(row)?;
            if endpoint.subscribed_to(trigger) {
                endpoints.push(endpoint);
            }
        }
        Ok(endpoints)
    }

    /// Writes `state` if the row still carries `expected_lock_version`.
    /// Returns `false` when another writer got there first.
    pub async fn write_tracker(
        &self,
        id: Uuid,
        expected_lock_version: i64,
        state: &TrackerState,
    ) -> Result<bool, StoreError> {
        store_tracker(&self.pool, id, expected_lock_version, state).await
    }

    /// Applies `transition` to the stored tracker fields as one serialized
    /// read-modify-write, so concurrent updates are never lost.
    pub async fn update_tracker<F>(&self, id: Uuid, transition: F) -> Result<TrackerState, StoreError>
    where
        F: Fn(TrackerState) -> TrackerState,
    {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before the read, so
        // other tracker updates wait instead of racing on a stale snapshot.
        let claimed = sqlx::query("UPDATE endpoints SET lock_version = lock_version WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("endpoint {id} not found")));
        }

        let row = fetch_row(&mut *tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("endpoint {id} not found")))?;
        let endpoint = self.decode(row)?;
        let current = TrackerState::of(&endpoint);
        let next = transition(current);
        if next == current {
            tx.rollback().await?;
            return Ok(current);
        }

        if !store_tracker(&mut *tx, id, endpoint.lock_version, &next).await? {
            return Err(StoreError::Conflict(format!(
                "endpoint {id} changed while its tracker was locked"
            )));
        }
        tx.commit().await?;

        Ok(next)
    }

    /// Manual re-enable: clears any backoff or permanent disable.
    pub async fn enable(&self, id: Uuid) -> Result<Endpoint, StoreError> {
        self.update_tracker(id, |_| TrackerState::enabled()).await?;
        self.get(id).await
    }

    /// Removes the endpoint row. Logs left behind are removed by the cascade.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn decode(&self, row: EndpointRow) -> Result<Endpoint, StoreError> {
        let url = self.secrets.open(&row.encrypted_url)?;
        let variables = self.secrets.open(&row.encrypted_url_variables)?;
        let url_variables: BTreeMap<String, String> = serde_json::from_str(&variables)
            .map_err(|err| StoreError::Parse(format!("invalid url variables JSON: {err}")))?;
        let token = match row.encrypted_token.as_deref() {
            Some(sealed) => Some(self.secrets.open(sealed)?),
            None => None,
        };
        let events: Vec<HookTrigger> = serde_json::from_str(&row.events)
            .map_err(|err| StoreError::Parse(format!("invalid events JSON: {err}")))?;

        Ok(Endpoint {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid endpoint id: {err}")))?,
            url,
            url_variables,
            token,
            rate_limit: to_u32("rate_limit", row.rate_limit)?,
            events,
            branch_filter_strategy: parse_strategy(&row.branch_filter_strategy)?,
            push_events_branch_filter: row.push_events_branch_filter,
            enable_ssl_verification: row.enable_ssl_verification,
            disabled: parse_disabled(&row.disabled_state, row.disabled_until.as_deref())?,
            recent_failures: to_u32("recent_failures", row.recent_failures)?,
            backoff_count: to_u32("backoff_count", row.backoff_count)?,
            lock_version: row.lock_version,
            created_at: parse_utc("created_at", &row.created_at)?,
        })
    }
}

async fn fetch_row<'e, E>(executor: E, id: Uuid) -> Result<Option<EndpointRow>, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, EndpointRow>(
        r#"
        SELECT
            id, encrypted_url, encrypted_url_variables, encrypted_token,
            rate_limit, events, branch_filter_strategy, push_events_branch_filter,
            enable_ssl_verification, disabled_state, disabled_until,
            recent_failures, backoff_count, lock_version, created_at
        FROM endpoints
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

async fn store_tracker<'e, E>(
    executor: E,
    id: Uuid,
    expected_lock_version: i64,
    state: &TrackerState,
) -> Result<bool, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE endpoints
        SET disabled_state = ?,
            disabled_until = ?,
            recent_failures = ?,
            backoff_count = ?,
            lock_version = lock_version + 1
        WHERE id = ?
          AND lock_version = ?
        "#,
    )
    .bind(state.disabled.as_str())
    .bind(state.disabled.disabled_until().map(format_utc))
    .bind(i64::from(state.recent_failures))
    .bind(i64::from(state.backoff_count))
    .bind(id.to_string())
    .bind(expected_lock_version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: String,
    encrypted_url: String,
    encrypted_url_variables: String,
    encrypted_token: Option<String>,
    rate_limit: i64,
    events: String,
    branch_filter_strategy: String,
    push_events_branch_filter: Option<String>,
    enable_ssl_verification: bool,
    disabled_state: String,
    disabled_until: Option<String>,
    recent_failures: i64,
    backoff_count: i64,
    lock_version: i64,
    created_at: String,
}

fn to_u32(field: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Parse(format!("{field} out of range: {value}")))
}

fn parse_strategy(value: &str) -> Result<BranchFilterStrategy, StoreError> {
    match value {
        "wildcard" => Ok(BranchFilterStrategy::Wildcard),
        "regex" => Ok(BranchFilterStrategy::Regex),
        "all_branches" => Ok(BranchFilterStrategy::AllBranches),
        _ => Err(StoreError::Parse(format!(
            "unknown branch filter strategy: {value}"
        ))),
    }
}

fn parse_disabled(state: &str, until: Option<&str>) -> Result<DisabledState, StoreError> {
    match (state, until) {
        ("enabled", _) => Ok(DisabledState::Enabled),
        ("backing_off", Some(until)) => Ok(DisabledState::BackingOff {
            until: parse_utc("disabled_until", until)?,
        }),
        ("backing_off", None) => Err(StoreError::Parse(
            "backing_off without disabled_until".to_string(),
        )),
        ("permanently_disabled", _) => Ok(DisabledState::PermanentlyDisabled),
        (other, _) => Err(StoreError::Parse(format!("unknown disabled state: {other}"))),
    }
}
