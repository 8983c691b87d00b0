//! Outbound HTTP delivery.

pub mod executor;
pub mod transport;

pub use executor::DeliveryExecutor;
pub use transport::{HttpTransport, OutboundRequest, ReqwestTransport, TransportError, TransportResponse};
