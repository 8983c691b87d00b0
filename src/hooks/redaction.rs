//! What a delivery log is allowed to keep: e-mail addresses are redacted and
//! oversized fields are replaced whole by a sentinel, never cut short.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Stored as the response body (or a header value) when it exceeds its limit.
pub const OVERSIZE_MARKER: &str = "[oversize: not stored]";

static EMAIL: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
});

/// Stored as `request_data` when the payload exceeds its limit.
pub fn oversize_request_data() -> Value {
    serde_json::json!({ "_oversize": true })
}

pub fn is_oversize_sentinel(value: &Value) -> bool {
    *value == oversize_request_data()
}

/// Replaces e-mail addresses in every string nested inside `value`.
pub fn redact_emails(value: &mut Value) {
    match value {
        Value::String(text) => {
            if let Some(redacted) = redact_text(text) {
                *text = redacted;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_emails),
        Value::Object(fields) => fields.values_mut().for_each(redact_emails),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Returns the redacted text, or `None` if nothing needed redacting.
pub fn redact_text(text: &str) -> Option<String> {
    let pattern = EMAIL.as_ref().ok()?;
    if pattern.is_match(text) {
        Some(pattern.replace_all(text, REDACTED).into_owned())
    } else {
        None
    }
}

/// The form of `payload` that may be written to the Log Store.
pub fn request_data_for_log(payload: &Value, limit_bytes: usize) -> Value {
    let size = serde_json::to_vec(payload).map_or(usize::MAX, |bytes| bytes.len());
    if size > limit_bytes {
        return oversize_request_data();
    }
    let mut data = payload.clone();
    redact_emails(&mut data);
    data
}

/// The form of a response body that may be written to the Log Store.
///
/// Bodies that are not valid UTF-8 are stored empty.
pub fn response_body_for_log(body: &[u8], limit_bytes: usize) -> String {
    if body.len() > limit_bytes {
        return OVERSIZE_MARKER.to_string();
    }
    match std::str::from_utf8(body) {
        Ok(text) => redact_text(text).unwrap_or_else(|| text.to_string()),
        Err(_) => String::new(),
    }
}

pub fn header_value_for_log(value: &str, limit_bytes: usize) -> String {
    if value.len() > limit_bytes {
        OVERSIZE_MARKER.to_string()
    } else {
        value.to_string()
    }
}

/// `content-type` -> `Content-Type`.
pub fn capitalize_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
