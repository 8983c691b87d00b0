use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::transport::{HttpTransport, OutboundRequest, TransportError, TransportResponse};
use crate::auto_disable::TrackerState;
use crate::dispatcher::DispatcherConfig;
use crate::hooks::interpolation::{interpolate, InterpolationError};
use crate::hooks::redaction::{
    capitalize_header_name, header_value_for_log, request_data_for_log, response_body_for_log,
    REDACTED,
};
use crate::hooks::url_policy::{self, BasicAuth, UrlPolicyError};
use crate::store::{EndpointStore, LogStore, StoreError};
use crate::types::{
    DeliveryErrorKind, DeliveryFailure, DeliveryOutcome, DisabledState, Endpoint, HookTrigger,
    WebHookLog,
};

pub const USER_AGENT: &str = concat!("hook-dispatch/", env!("CARGO_PKG_VERSION"));

pub const EVENT_HEADER: &str = "X-Hook-Event";
pub const EVENT_UUID_HEADER: &str = "X-Hook-Event-UUID";
pub const INSTANCE_HEADER: &str = "X-Hook-Instance";
pub const TOKEN_HEADER: &str = "X-Hook-Token";

const MAX_ERROR_MESSAGE_CHARS: usize = 1024;

enum AttemptError {
    Timeout,
    Network(String),
    Internal(String),
}

/// Performs one HTTP delivery, records it in the Log Store and feeds the
/// result into the endpoint's auto-disable state.
#[derive(Clone)]
pub struct DeliveryExecutor {
    transport: Arc<dyn HttpTransport>,
    endpoints: EndpointStore,
    logs: LogStore,
    config: Arc<DispatcherConfig>,
}

impl DeliveryExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: EndpointStore,
        logs: LogStore,
        config: Arc<DispatcherConfig>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            logs,
            config,
        }
    }

    /// Delivers `payload` to `endpoint`.
    ///
    /// HTTP failures, timeouts and internal errors come back as
    /// [`DeliveryOutcome::Failure`]; only a URL template that cannot be
    /// interpolated is an error, and then nothing is sent or recorded.
    pub async fn deliver(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        payload: &Value,
        event_uuid: Uuid,
    ) -> Result<DeliveryOutcome, InterpolationError> {
        let url = interpolate(&endpoint.url, &endpoint.url_variables)?;

        let created_at = Utc::now();
        let started = Instant::now();
        let headers = self.request_headers(endpoint, trigger, event_uuid);

        let result = match tokio::time::timeout(
            self.config.request_timeout(),
            self.send(endpoint, &url, headers.clone(), payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout),
        };
        let execution_duration = started.elapsed().as_secs_f64();

        let mut log = WebHookLog {
            id: Uuid::new_v4(),
            endpoint_id: endpoint.id,
            trigger,
            url: url_policy::strip_credentials(&endpoint.url),
            request_headers: logged_request_headers(headers),
            request_data: request_data_for_log(payload, self.config.request_data_log_limit),
            response_status: None,
            response_headers: BTreeMap::new(),
            response_body: String::new(),
            execution_duration,
            error_kind: None,
            internal_error_message: None,
            created_at,
        };

        let outcome = match result {
            Ok(response) => {
                log.response_status = Some(response.status);
                log.response_headers = self.logged_response_headers(&response);
                log.response_body =
                    response_body_for_log(&response.body, self.config.response_body_limit);

                let message = log.response_body.clone();
                if (200..300).contains(&response.status) {
                    DeliveryOutcome::Success {
                        http_status: response.status,
                        message,
                        log_id: None,
                    }
                } else {
                    DeliveryOutcome::Failure {
                        failure: DeliveryFailure::HttpStatus {
                            status: response.status,
                        },
                        message,
                        log_id: None,
                    }
                }
            }
            Err(err) => {
                let (failure, kind, message) = match err {
                    AttemptError::Timeout => (
                        DeliveryFailure::Timeout,
                        DeliveryErrorKind::Timeout,
                        format!(
                            "Request timed out after {}ms",
                            self.config.request_timeout_ms
                        ),
                    ),
                    AttemptError::Network(message) => (
                        DeliveryFailure::InternalError {
                            kind: DeliveryErrorKind::Network,
                        },
                        DeliveryErrorKind::Network,
                        message,
                    ),
                    AttemptError::Internal(message) => (
                        DeliveryFailure::InternalError {
                            kind: DeliveryErrorKind::Internal,
                        },
                        DeliveryErrorKind::Internal,
                        message,
                    ),
                };
                let message = bounded(&message);
                log.error_kind = Some(kind);
                log.internal_error_message = Some(message.clone());

                DeliveryOutcome::Failure {
                    failure,
                    message,
                    log_id: None,
                }
            }
        };

        let logged = self.record(endpoint, &log, outcome.is_success()).await;

        Ok(match outcome {
            DeliveryOutcome::Success {
                http_status,
                message,
                ..
            } => DeliveryOutcome::Success {
                http_status,
                message,
                log_id: logged.then_some(log.id),
            },
            DeliveryOutcome::Failure {
                failure, message, ..
            } => DeliveryOutcome::Failure {
                failure,
                message,
                log_id: logged.then_some(log.id),
            },
            skipped => skipped,
        })
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        url: &str,
        mut headers: Vec<(String, String)>,
        payload: &Value,
    ) -> Result<TransportResponse, AttemptError> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| AttemptError::Internal(format!("payload could not be serialized: {err}")))?;
        if body.len() > self.config.request_body_limit {
            return Err(AttemptError::Internal(format!(
                "request body too large ({} bytes, limit {})",
                body.len(),
                self.config.request_body_limit
            )));
        }

        let url = url_policy::parse_hook_url(url).map_err(policy_error)?;
        url_policy::check_resolved(&url, self.config.allow_local_requests)
            .await
            .map_err(policy_error)?;
        let (url, basic_auth) = url_policy::split_userinfo(url);
        if let Some(auth) = basic_auth {
            headers.push(("Authorization".to_string(), basic_authorization(&auth)));
        }

        let request = OutboundRequest {
            url,
            headers,
            body,
            verify_tls: endpoint.enable_ssl_verification,
            timeout: self.config.request_timeout(),
            max_response_bytes: self.config.response_body_limit,
        };

        self.transport.post(request).await.map_err(|err| match err {
            TransportError::Timeout => AttemptError::Timeout,
            TransportError::Network(message) => AttemptError::Network(message),
        })
    }

    fn request_headers(
        &self,
        endpoint: &Endpoint,
        trigger: HookTrigger,
        event_uuid: Uuid,
    ) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            (EVENT_HEADER.to_string(), trigger.event_header().to_string()),
            (EVENT_UUID_HEADER.to_string(), event_uuid.to_string()),
            (INSTANCE_HEADER.to_string(), self.config.instance_url.clone()),
        ];
        if let Some(token) = &endpoint.token {
            headers.push((TOKEN_HEADER.to_string(), token.clone()));
        }
        headers
    }

    fn logged_response_headers(&self, response: &TransportResponse) -> BTreeMap<String, String> {
        let mut logged = BTreeMap::new();
        for (name, value) in response.headers.iter().take(self.config.response_headers_limit) {
            let value = header_value_for_log(value, self.config.response_header_size_limit);
            logged
                .entry(capitalize_header_name(name))
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        logged
    }

    /// Appends the log entry and updates the tracker independently; a failure
    /// of one does not undo or skip the other. Returns whether the entry was
    /// stored.
    async fn record(&self, endpoint: &Endpoint, log: &WebHookLog, succeeded: bool) -> bool {
        let (appended, tracked) =
            tokio::join!(self.logs.append(log), self.update_tracker(endpoint, succeeded));

        if let Err(err) = &tracked {
            error!(
                hook_id = %endpoint.id,
                trigger = log.trigger.as_str(),
                error = %err,
                "auto-disable update failed"
            );
        }
        match appended {
            Ok(()) => true,
            Err(err) => {
                error!(
                    hook_id = %endpoint.id,
                    trigger = log.trigger.as_str(),
                    error = %err,
                    "delivery log append failed"
                );
                false
            }
        }
    }

    async fn update_tracker(&self, endpoint: &Endpoint, succeeded: bool) -> Result<(), StoreError> {
        let policy = &self.config.auto_disable;
        let now = Utc::now();
        let next = self
            .endpoints
            .update_tracker(endpoint.id, |current| {
                if succeeded {
                    policy.on_success()
                } else {
                    policy.on_failure(current, now)
                }
            })
            .await?;

        log_transition(endpoint, &next);
        Ok(())
    }
}

fn log_transition(endpoint: &Endpoint, next: &TrackerState) {
    if next.disabled == endpoint.disabled {
        return;
    }
    match next.disabled {
        DisabledState::Enabled => {
            info!(hook_id = %endpoint.id, "hook re-enabled after successful delivery");
        }
        DisabledState::BackingOff { until } => {
            warn!(
                hook_id = %endpoint.id,
                recent_failures = next.recent_failures,
                backoff_count = next.backoff_count,
                disabled_until = %until,
                "hook backing off"
            );
        }
        DisabledState::PermanentlyDisabled => {
            warn!(
                hook_id = %endpoint.id,
                recent_failures = next.recent_failures,
                "hook permanently disabled"
            );
        }
    }
}

/// `user` without a password encodes as `user:`.
fn basic_authorization(auth: &BasicAuth) -> String {
    let credentials = format!(
        "{}:{}",
        auth.username,
        auth.password.as_deref().unwrap_or_default()
    );
    format!("Basic {}", STANDARD.encode(credentials))
}

fn policy_error(err: UrlPolicyError) -> AttemptError {
    match err {
        UrlPolicyError::Unresolved(_) => AttemptError::Network(err.to_string()),
        other => AttemptError::Internal(other.to_string()),
    }
}

fn logged_request_headers(headers: Vec<(String, String)>) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .map(|(name, value)| {
            if name == TOKEN_HEADER {
                (name, REDACTED.to_string())
            } else {
                (name, value)
            }
        })
        .collect()
}

fn bounded(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_CHARS) {
        Some((end, _)) => message[..end].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_authorization_encodes_missing_password_as_empty() {
        let auth = BasicAuth {
            username: "demo".to_string(),
            password: None,
        };
        assert_eq!(basic_authorization(&auth), "Basic ZGVtbzo=");

        let auth = BasicAuth {
            username: "demo".to_string(),
            password: Some("secret".to_string()),
        };
        assert_eq!(basic_authorization(&auth), "Basic ZGVtbzpzZWNyZXQ=");
    }

    #[test]
    fn token_is_masked_in_logged_headers() {
        let logged = logged_request_headers(vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (TOKEN_HEADER.to_string(), "s3cr3t".to_string()),
        ]);

        assert_eq!(logged[TOKEN_HEADER], REDACTED);
        assert_eq!(logged["Content-Type"], "application/json");
    }

    #[test]
    fn error_messages_are_bounded_on_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_MESSAGE_CHARS + 10);
        let cut = bounded(&long);
        assert_eq!(cut.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert_eq!(bounded("short"), "short");
    }
}
