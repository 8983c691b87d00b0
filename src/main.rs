use std::{net::SocketAddr, str::FromStr, sync::Arc};

use hook_dispatch::{
    delivery::{ReqwestTransport, executor::USER_AGENT},
    dispatcher::{Dispatcher, DispatcherConfig},
    rate_limit::RateLimiter,
    retention::spawn_sweeper,
    routes::router,
    state::AppState,
    store::{EndpointStore, LogStore, PassthroughSecrets},
    telemetry::init_tracing,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:hook_dispatch.db".to_string());
    let bind_addr = std::env::var("HOOK_DISPATCH_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let api_token = std::env::var("HOOK_DISPATCH_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let config = DispatcherConfig::from_env();
    let retention_months = config.log_retention_months;
    let transport = Arc::new(ReqwestTransport::new(USER_AGENT, config.allow_local_requests)?);
    let endpoints = EndpointStore::new(pool.clone(), Arc::new(PassthroughSecrets));
    let logs = LogStore::new(pool);

    let (dispatcher, _workers) = Dispatcher::start(
        endpoints,
        logs.clone(),
        transport,
        RateLimiter::in_memory(),
        config,
    );
    let _sweeper = spawn_sweeper(logs, retention_months);

    let app = router(AppState {
        dispatcher,
        api_token,
    });

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "hook dispatch listening");
    axum::serve(listener, app).await?;

    Ok(())
}
