use regex::Regex;

use crate::types::{BranchFilterStrategy, Endpoint};

/// Compiles a branch filter into a matcher. `None` filters and empty wildcard
/// filters match every branch.
pub fn compile(
    strategy: BranchFilterStrategy,
    filter: Option<&str>,
) -> Result<Option<Regex>, regex::Error> {
    let filter = filter.map(str::trim).filter(|filter| !filter.is_empty());
    match (strategy, filter) {
        (BranchFilterStrategy::AllBranches, _) | (_, None) => Ok(None),
        (BranchFilterStrategy::Regex, Some(filter)) => Regex::new(filter).map(Some),
        (BranchFilterStrategy::Wildcard, Some(filter)) => {
            let pattern = filter
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            Regex::new(&format!("^{pattern}$")).map(Some)
        }
    }
}

/// Whether a push to `branch` should be delivered to `endpoint`.
///
/// A filter that no longer compiles matches nothing; filters are validated
/// when an endpoint is saved, so this only happens with hand-edited rows.
pub fn matches_branch(endpoint: &Endpoint, branch: &str) -> bool {
    match compile(
        endpoint.branch_filter_strategy,
        endpoint.push_events_branch_filter.as_deref(),
    ) {
        Ok(None) => true,
        Ok(Some(regex)) => regex.is_match(branch),
        Err(err) => {
            tracing::warn!(hook_id = %endpoint.id, error = %err, "invalid branch filter");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn is_match(strategy: BranchFilterStrategy, filter: &str, branch: &str) -> bool {
        match compile(strategy, Some(filter)).unwrap() {
            None => true,
            Some(regex) => regex.is_match(branch),
        }
    }

    #[test]
    fn wildcard_matches_glob() {
        assert!(is_match(BranchFilterStrategy::Wildcard, "release/*", "release/1.0"));
        assert!(is_match(BranchFilterStrategy::Wildcard, "main", "main"));
        assert!(!is_match(BranchFilterStrategy::Wildcard, "main", "main-old"));
        assert!(!is_match(BranchFilterStrategy::Wildcard, "release/*", "feature/x"));
    }

    #[test]
    fn wildcard_escapes_regex_metacharacters() {
        assert!(is_match(BranchFilterStrategy::Wildcard, "v1.0", "v1.0"));
        assert!(!is_match(BranchFilterStrategy::Wildcard, "v1.0", "v1x0"));
    }

    #[test]
    fn regex_filter_uses_regex_semantics() {
        assert!(is_match(BranchFilterStrategy::Regex, "^(main|develop)$", "develop"));
        assert!(!is_match(BranchFilterStrategy::Regex, "^(main|develop)$", "feature"));
    }

    #[test]
    fn all_branches_ignores_filter() {
        assert!(is_match(BranchFilterStrategy::AllBranches, "main", "anything"));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(compile(BranchFilterStrategy::Wildcard, Some("  ")).unwrap().is_none());
        assert!(compile(BranchFilterStrategy::Regex, None).unwrap().is_none());
    }

    #[test]
    fn invalid_regex_is_an_error() {
        assert!(compile(BranchFilterStrategy::Regex, Some("(unclosed")).is_err());
    }
}
