use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Bearer token required on `/api`; `None` leaves it open.
    pub api_token: Option<String>,
}
