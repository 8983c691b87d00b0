pub mod api;
pub mod api_error;
pub mod delivery;
pub mod endpoint;
pub mod web_hook_log;

#[allow(unused_imports)]
pub use api::{
    CreateEndpointResponse, DispatchEventResponse, EndpointSummary, ExecuteHookRequest,
    ExecuteHookResponse, HookEventRequest, RecentLogsResponse, TestHookRequest, TestHookResponse,
};
#[allow(unused_imports)]
pub use api_error::{ApiErrorCode, ApiErrorResponse};
#[allow(unused_imports)]
pub use delivery::{DeliveryFailure, DeliveryOutcome, DispatchMode, ExecuteOutcome};
#[allow(unused_imports)]
pub use endpoint::{BranchFilterStrategy, DisabledState, Endpoint, HookTrigger, NewEndpoint};
#[allow(unused_imports)]
pub use web_hook_log::{DeliveryErrorKind, WebHookLog};
