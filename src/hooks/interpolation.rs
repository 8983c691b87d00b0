use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

const VARIABLE_NAME: &str = r"[A-Za-z]+[0-9]*(?:[._-][A-Za-z0-9]+)*";

static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(&format!(r"\{{({VARIABLE_NAME})\}}")));

static WHOLE_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(&format!("^{VARIABLE_NAME}$")));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("Invalid URL template. Missing key {0}")]
    MissingVariable(String),
    #[error("Invalid URL template: {0}")]
    InvalidPattern(String),
}

fn placeholder() -> Result<&'static Regex, InterpolationError> {
    PLACEHOLDER
        .as_ref()
        .map_err(|err| InterpolationError::InvalidPattern(err.to_string()))
}

/// Expands every `{name}` placeholder in `url` with its value from `variables`.
///
/// Values are substituted verbatim and never rescanned, so a value that itself
/// looks like a placeholder stays literal.
pub fn interpolate(
    url: &str,
    variables: &BTreeMap<String, String>,
) -> Result<String, InterpolationError> {
    if !url.contains('{') {
        return Ok(url.to_string());
    }

    let pattern = placeholder()?;
    if let Some(missing) = pattern
        .captures_iter(url)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .find(|name| !variables.contains_key(*name))
    {
        return Err(InterpolationError::MissingVariable(missing.to_string()));
    }

    let expanded = pattern.replace_all(url, |caps: &Captures<'_>| {
        caps.get(1)
            .and_then(|name| variables.get(name.as_str()))
            .cloned()
            .unwrap_or_default()
    });

    Ok(expanded.into_owned())
}

/// Whether `name` can be referenced as a `{name}` placeholder.
pub fn is_valid_variable_name(name: &str) -> bool {
    WHOLE_NAME
        .as_ref()
        .is_ok_and(|pattern| pattern.is_match(name))
}

/// Names of all placeholders referenced by `url`.
pub fn referenced_variables(url: &str) -> Result<BTreeSet<String>, InterpolationError> {
    if !url.contains('{') {
        return Ok(BTreeSet::new());
    }

    let pattern = placeholder()?;
    Ok(pattern
        .captures_iter(url)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
        .collect())
}
