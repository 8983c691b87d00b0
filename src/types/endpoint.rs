use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

/// A configured webhook destination.
///
/// Plain data: delivery behaviour lives in the interpolation, rate limiting,
/// auto-disable and delivery components. `url`, `url_variables` and `token`
/// are secrets and are only ever held decrypted in memory.
#[derive(Clone, PartialEq)]
pub struct Endpoint {
    pub id: Uuid,
    pub url: String,
    pub url_variables: BTreeMap<String, String>,
    pub token: Option<String>,
    /// Calls per minute. `0` means unlimited.
    pub rate_limit: u32,
    pub events: Vec<HookTrigger>,
    pub branch_filter_strategy: BranchFilterStrategy,
    pub push_events_branch_filter: Option<String>,
    pub enable_ssl_verification: bool,
    pub disabled: DisabledState,
    pub recent_failures: u32,
    pub backoff_count: u32,
    pub lock_version: i64,
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn from_new(id: Uuid, new: NewEndpoint, now: DateTime<Utc>) -> Self {
        Self {
            id,
            url: new.url,
            url_variables: new.url_variables,
            token: new.token.filter(|token| !token.is_empty()),
            rate_limit: new.rate_limit,
            events: new.events,
            branch_filter_strategy: new.branch_filter_strategy,
            push_events_branch_filter: new.push_events_branch_filter,
            enable_ssl_verification: new.enable_ssl_verification,
            disabled: DisabledState::Enabled,
            recent_failures: 0,
            backoff_count: 0,
            lock_version: 0,
            created_at: now,
        }
    }

    pub fn subscribed_to(&self, trigger: HookTrigger) -> bool {
        self.events.contains(&trigger)
    }
}

// Secrets stay out of `{:?}` output so an endpoint can be traced safely.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("url_variables", &self.url_variables.keys().collect::<Vec<_>>())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("rate_limit", &self.rate_limit)
            .field("events", &self.events)
            .field("branch_filter_strategy", &self.branch_filter_strategy)
            .field("disabled", &self.disabled)
            .field("recent_failures", &self.recent_failures)
            .field("backoff_count", &self.backoff_count)
            .field("lock_version", &self.lock_version)
            .finish_non_exhaustive()
    }
}

/// Configuration submitted when an endpoint is created.
#[derive(Clone, Serialize, Deserialize, Type)]
pub struct NewEndpoint {
    pub url: String,
    #[serde(default)]
    pub url_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default = "default_events")]
    pub events: Vec<HookTrigger>,
    #[serde(default)]
    pub branch_filter_strategy: BranchFilterStrategy,
    #[serde(default)]
    pub push_events_branch_filter: Option<String>,
    #[serde(default = "default_ssl_verification")]
    pub enable_ssl_verification: bool,
}

fn default_events() -> Vec<HookTrigger> {
    vec![HookTrigger::PushHooks]
}

fn default_ssl_verification() -> bool {
    true
}

/// Auto-disable state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DisabledState {
    Enabled,
    /// Temporarily disabled; eligible again once `until` has passed.
    BackingOff { until: DateTime<Utc> },
    /// Disabled until someone re-enables the endpoint by hand.
    PermanentlyDisabled,
}

impl DisabledState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisabledState::Enabled => "enabled",
            DisabledState::BackingOff { .. } => "backing_off",
            DisabledState::PermanentlyDisabled => "permanently_disabled",
        }
    }

    pub fn disabled_until(&self) -> Option<DateTime<Utc>> {
        match self {
            DisabledState::BackingOff { until } => Some(*until),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum BranchFilterStrategy {
    #[default]
    Wildcard,
    Regex,
    AllBranches,
}

impl BranchFilterStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchFilterStrategy::Wildcard => "wildcard",
            BranchFilterStrategy::Regex => "regex",
            BranchFilterStrategy::AllBranches => "all_branches",
        }
    }
}

/// The kind of event that caused a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum HookTrigger {
    PushHooks,
    TagPushHooks,
    IssueHooks,
    ConfidentialIssueHooks,
    NoteHooks,
    MergeRequestHooks,
    JobHooks,
    PipelineHooks,
    WikiPageHooks,
    DeploymentHooks,
    ReleaseHooks,
}

impl HookTrigger {
    pub const ALL: [HookTrigger; 11] = [
        HookTrigger::PushHooks,
        HookTrigger::TagPushHooks,
        HookTrigger::IssueHooks,
        HookTrigger::ConfidentialIssueHooks,
        HookTrigger::NoteHooks,
        HookTrigger::MergeRequestHooks,
        HookTrigger::JobHooks,
        HookTrigger::PipelineHooks,
        HookTrigger::WikiPageHooks,
        HookTrigger::DeploymentHooks,
        HookTrigger::ReleaseHooks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookTrigger::PushHooks => "push_hooks",
            HookTrigger::TagPushHooks => "tag_push_hooks",
            HookTrigger::IssueHooks => "issue_hooks",
            HookTrigger::ConfidentialIssueHooks => "confidential_issue_hooks",
            HookTrigger::NoteHooks => "note_hooks",
            HookTrigger::MergeRequestHooks => "merge_request_hooks",
            HookTrigger::JobHooks => "job_hooks",
            HookTrigger::PipelineHooks => "pipeline_hooks",
            HookTrigger::WikiPageHooks => "wiki_page_hooks",
            HookTrigger::DeploymentHooks => "deployment_hooks",
            HookTrigger::ReleaseHooks => "release_hooks",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|trigger| trigger.as_str() == value)
    }

    /// Value of the event header sent with every delivery.
    pub fn event_header(&self) -> &'static str {
        match self {
            HookTrigger::PushHooks => "Push Hook",
            HookTrigger::TagPushHooks => "Tag Push Hook",
            HookTrigger::IssueHooks => "Issue Hook",
            HookTrigger::ConfidentialIssueHooks => "Confidential Issue Hook",
            HookTrigger::NoteHooks => "Note Hook",
            HookTrigger::MergeRequestHooks => "Merge Request Hook",
            HookTrigger::JobHooks => "Job Hook",
            HookTrigger::PipelineHooks => "Pipeline Hook",
            HookTrigger::WikiPageHooks => "Wiki Page Hook",
            HookTrigger::DeploymentHooks => "Deployment Hook",
            HookTrigger::ReleaseHooks => "Release Hook",
        }
    }

    /// Push-style triggers are subject to the endpoint's branch filter.
    pub fn is_branch_scoped(&self) -> bool {
        matches!(self, HookTrigger::PushHooks | HookTrigger::TagPushHooks)
    }
}
