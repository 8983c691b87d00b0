use thiserror::Error;

use crate::hooks::{
    branch_filter,
    interpolation::{self, InterpolationError},
    url_policy::{self, UrlPolicyError},
};
use crate::types::Endpoint;

pub const MAX_URL_VARIABLES: usize = 20;
pub const MAX_URL_VARIABLE_VALUE_LEN: usize = 2048;
pub const MAX_URL_LEN: usize = 2048;

/// Configuration problems that prevent an endpoint from being saved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Url(#[from] UrlPolicyError),
    #[error("URL is too long (maximum is {MAX_URL_LEN} characters)")]
    UrlTooLong,
    #[error("Invalid URL template. Missing keys: {0:?}")]
    MissingUrlVariables(Vec<String>),
    #[error("Invalid URL variable name: {0}")]
    InvalidVariableName(String),
    #[error("URL variable {0} is blank or longer than {MAX_URL_VARIABLE_VALUE_LEN} characters")]
    InvalidVariableValue(String),
    #[error("Too many URL variables (maximum is {MAX_URL_VARIABLES})")]
    TooManyVariables,
    #[error("Invalid branch filter: {0}")]
    InvalidBranchFilter(String),
    #[error("At least one trigger must be selected")]
    NoEvents,
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

/// Checks an endpoint's configuration before it is saved or dispatched.
pub fn validate_endpoint(endpoint: &Endpoint, allow_local: bool) -> Result<(), ValidationError> {
    if endpoint.url.len() > MAX_URL_LEN {
        return Err(ValidationError::UrlTooLong);
    }
    if endpoint.events.is_empty() {
        return Err(ValidationError::NoEvents);
    }
    if endpoint.url_variables.len() > MAX_URL_VARIABLES {
        return Err(ValidationError::TooManyVariables);
    }

    for (name, value) in &endpoint.url_variables {
        if !interpolation::is_valid_variable_name(name) {
            return Err(ValidationError::InvalidVariableName(name.clone()));
        }
        if value.is_empty() || value.len() > MAX_URL_VARIABLE_VALUE_LEN {
            return Err(ValidationError::InvalidVariableValue(name.clone()));
        }
    }

    let missing: Vec<String> = interpolation::referenced_variables(&endpoint.url)?
        .into_iter()
        .filter(|name| !endpoint.url_variables.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingUrlVariables(missing));
    }

    let resolved = interpolation::interpolate(&endpoint.url, &endpoint.url_variables)?;
    let url = url_policy::parse_hook_url(&resolved)?;
    url_policy::check_public(&url, allow_local)?;

    branch_filter::compile(
        endpoint.branch_filter_strategy,
        endpoint.push_events_branch_filter.as_deref(),
    )
    .map_err(|err| ValidationError::InvalidBranchFilter(err.to_string()))?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::types::{BranchFilterStrategy, HookTrigger, NewEndpoint};

    fn endpoint(url: &str, variables: &[(&str, &str)]) -> Endpoint {
        Endpoint::from_new(
            Uuid::new_v4(),
            NewEndpoint {
                url: url.to_string(),
                url_variables: variables
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
                token: None,
                rate_limit: 0,
                events: vec![HookTrigger::PushHooks],
                branch_filter_strategy: BranchFilterStrategy::Wildcard,
                push_events_branch_filter: None,
                enable_ssl_verification: true,
            },
            Utc::now(),
        )
    }

    #[test]
    fn accepts_a_template_with_all_variables() {
        let hook = endpoint("https://{host}/hook", &[("host", "example.com")]);
        assert_eq!(validate_endpoint(&hook, false), Ok(()));
    }

    #[test]
    fn rejects_missing_variables() {
        let hook = endpoint("https://{host}/{path}", &[("host", "example.com")]);
        assert_eq!(
            validate_endpoint(&hook, false),
            Err(ValidationError::MissingUrlVariables(vec!["path".to_string()]))
        );
    }

    #[test]
    fn rejects_local_targets_after_interpolation() {
        let hook = endpoint("http://{host}/hook", &[("host", "127.0.0.1")]);
        assert!(matches!(
            validate_endpoint(&hook, false),
            Err(ValidationError::Url(UrlPolicyError::LocalNetwork(_)))
        ));
        assert_eq!(validate_endpoint(&hook, true), Ok(()));
    }

    #[test]
    fn rejects_bad_variable_names() {
        let hook = endpoint("https://example.com", &[("9lives", "x")]);
        assert_eq!(
            validate_endpoint(&hook, false),
            Err(ValidationError::InvalidVariableName("9lives".to_string()))
        );
    }

    #[test]
    fn rejects_invalid_regex_filter() {
        let mut hook = endpoint("https://example.com", &[]);
        hook.branch_filter_strategy = BranchFilterStrategy::Regex;
        hook.push_events_branch_filter = Some("(".to_string());
        assert!(matches!(
            validate_endpoint(&hook, false),
            Err(ValidationError::InvalidBranchFilter(_))
        ));
    }

    #[test]
    fn rejects_endpoints_without_triggers() {
        let mut hook = endpoint("https://example.com", &[]);
        hook.events.clear();
        assert_eq!(validate_endpoint(&hook, false), Err(ValidationError::NoEvents));
    }
}
