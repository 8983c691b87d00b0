#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hook_dispatch::{
    delivery::{HttpTransport, OutboundRequest, TransportError, TransportResponse},
    dispatcher::{Dispatcher, DispatcherConfig},
    rate_limit::RateLimiter,
    store::{EndpointStore, LogStore, PassthroughSecrets},
    types::{BranchFilterStrategy, Endpoint, HookTrigger, NewEndpoint},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Connection;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub struct TestDb {
    pub pool: sqlx::SqlitePool,
    _db_file: NamedTempFile,
}

pub async fn setup_db() -> TestDb {
    setup_db_with(1, Duration::from_millis(500)).await
}

/// Like [`setup_db`], with a pool of `max_connections` writers contending on one file.
pub async fn setup_db_with(max_connections: u32, busy_timeout: Duration) -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(busy_timeout);

    let mut conn = sqlx::SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite");

    let mut entries: Vec<_> = fs::read_dir("migrations")
        .expect("read migrations dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let contents = fs::read_to_string(entry.path()).expect("read migration");
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&mut conn)
                    .await
                    .expect("run migration");
            }
        }
    }
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .expect("connect pool");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

type Responder = dyn Fn(usize) -> Result<TransportResponse, TransportError> + Send + Sync;

/// Records every request and answers from a script instead of the network.
pub struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
    respond: Box<Responder>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new(
        respond: impl Fn(usize) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
            delay: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::new(move |_| Ok(response(status, b"ok")))
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::status(200)
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn response(status: u16, body: &[u8]) -> TransportResponse {
    TransportResponse {
        status,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: body.to_vec(),
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(call)
    }
}

/// Defaults for tests: local targets allowed so nothing is resolved over DNS.
pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        allow_local_requests: true,
        workers: 2,
        queue_capacity: 16,
        ..DispatcherConfig::default()
    }
}

pub struct Harness {
    pub db: TestDb,
    pub endpoints: EndpointStore,
    pub logs: LogStore,
    pub transport: Arc<RecordingTransport>,
    pub dispatcher: Dispatcher,
    pub worker: JoinHandle<()>,
}

impl Harness {
    pub async fn new(transport: RecordingTransport, config: DispatcherConfig) -> Self {
        let db = setup_db().await;
        let endpoints = EndpointStore::new(db.pool.clone(), Arc::new(PassthroughSecrets));
        let logs = LogStore::new(db.pool.clone());
        let transport = Arc::new(transport);
        let (dispatcher, worker) = Dispatcher::start(
            endpoints.clone(),
            logs.clone(),
            transport.clone(),
            RateLimiter::in_memory(),
            config,
        );

        Self {
            db,
            endpoints,
            logs,
            transport,
            dispatcher,
            worker,
        }
    }

    /// Stores an endpoint as-is, without configuration validation.
    pub async fn insert(&self, new: NewEndpoint) -> Endpoint {
        let endpoint = Endpoint::from_new(Uuid::new_v4(), new, Utc::now());
        self.endpoints.insert(&endpoint).await.expect("insert endpoint");
        endpoint
    }

    pub async fn reload(&self, endpoint: &Endpoint) -> Endpoint {
        self.endpoints.get(endpoint.id).await.expect("reload endpoint")
    }

    /// Drops the dispatcher and waits for queued jobs to finish.
    pub async fn drain(self) -> (TestDb, LogStore, EndpointStore, Arc<RecordingTransport>) {
        let Self {
            db,
            endpoints,
            logs,
            transport,
            dispatcher,
            worker,
        } = self;
        drop(dispatcher);
        worker.await.expect("worker pool");
        (db, logs, endpoints, transport)
    }
}

pub fn new_endpoint(url: &str) -> NewEndpoint {
    NewEndpoint {
        url: url.to_string(),
        url_variables: BTreeMap::new(),
        token: None,
        rate_limit: 0,
        events: vec![HookTrigger::PushHooks],
        branch_filter_strategy: BranchFilterStrategy::AllBranches,
        push_events_branch_filter: None,
        enable_ssl_verification: true,
    }
}
