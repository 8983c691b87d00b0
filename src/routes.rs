use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    auth::require_api_token,
    handlers::{
        events::dispatch_event_handler,
        hooks::{
            create_hook_handler, delete_hook_handler, enable_hook_handler, execute_hook_handler,
            get_hook_handler, recent_logs_handler, test_hook_handler,
        },
    },
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/hooks", post(create_hook_handler))
        .route(
            "/api/hooks/:id",
            get(get_hook_handler).delete(delete_hook_handler),
        )
        .route("/api/hooks/:id/enable", post(enable_hook_handler))
        .route("/api/hooks/:id/test", post(test_hook_handler))
        .route("/api/hooks/:id/execute", post(execute_hook_handler))
        .route("/api/hooks/:id/logs", get(recent_logs_handler))
        .route("/api/events", post(dispatch_event_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_token,
        ))
        .with_state(state)
}
