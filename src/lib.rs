pub mod auth;
pub mod auto_disable;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod hooks;
pub mod rate_limit;
pub mod recursion;
pub mod retention;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;
