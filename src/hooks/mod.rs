//! Pure building blocks applied to an endpoint's configuration: URL
//! templates, target policy, branch filters and log hygiene.

pub mod branch_filter;
pub mod interpolation;
pub mod redaction;
pub mod url_policy;
pub mod validation;

pub use interpolation::{InterpolationError, interpolate};
pub use url_policy::UrlPolicyError;
pub use validation::{ValidationError, validate_endpoint};
