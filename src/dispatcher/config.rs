use std::time::Duration;

use crate::auto_disable::AutoDisablePolicy;

pub const MAX_WORKERS: usize = 4096;
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub auto_disable: AutoDisablePolicy,
    pub request_timeout_ms: u64,
    pub allow_local_requests: bool,
    pub request_body_limit: usize,
    pub request_data_log_limit: usize,
    pub response_body_limit: usize,
    pub response_headers_limit: usize,
    pub response_header_size_limit: usize,
    pub workers: usize,
    pub queue_capacity: usize,
    pub log_retention_months: u32,
    pub instance_url: String,
    /// Most hooks one call chain may fire before the rest are blocked.
    pub recursion_count_limit: usize,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("HOOK_DISPATCH_FAILURE_THRESHOLD")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.auto_disable.failure_threshold = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_BACKOFF_BASE_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.auto_disable.backoff_base_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_BACKOFF_FACTOR")
            && let Ok(parsed) = value.parse::<f64>()
            && parsed >= 1.0
        {
            config.auto_disable.backoff_factor = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_BACKOFF_MAX_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.auto_disable.backoff_max_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_MAX_BACKOFF_CYCLES")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.auto_disable.max_backoff_cycles = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.request_timeout_ms = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_ALLOW_LOCAL_REQUESTS")
            && let Ok(parsed) = value.parse::<bool>()
        {
            config.allow_local_requests = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_REQUEST_BODY_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.request_body_limit = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_REQUEST_DATA_LOG_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.request_data_log_limit = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_RESPONSE_BODY_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.response_body_limit = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_RESPONSE_HEADERS_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.response_headers_limit = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_RESPONSE_HEADER_SIZE_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.response_header_size_limit = parsed;
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_WORKERS")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.workers = parsed.clamp(1, MAX_WORKERS);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_QUEUE_CAPACITY")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.queue_capacity = parsed.clamp(1, MAX_QUEUE_CAPACITY);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_LOG_RETENTION_MONTHS")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.log_retention_months = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_RECURSION_COUNT_LIMIT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.recursion_count_limit = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOK_DISPATCH_INSTANCE_URL")
            && !value.trim().is_empty()
        {
            config.instance_url = value.trim().to_string();
        }

        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auto_disable: AutoDisablePolicy::default(),
            request_timeout_ms: 10_000,
            allow_local_requests: false,
            request_body_limit: 25 * 1024 * 1024,
            request_data_log_limit: 100 * 1024,
            response_body_limit: 8 * 1024,
            response_headers_limit: 50,
            response_header_size_limit: 1024,
            workers: 8,
            queue_capacity: 1024,
            log_retention_months: 3,
            instance_url: "http://localhost".to_string(),
            recursion_count_limit: 100,
        }
    }
}
