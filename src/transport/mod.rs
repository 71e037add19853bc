//! Upstream transport: three call styles sharing one timeout/JSON/status
//! triage contract (spec §4.D).

pub mod fetch;
pub mod proxy;
pub mod raw_tls;

use std::time::Duration;

use serde_json::Value;

use crate::error::GatewayError;

/// A single upstream call, independent of which transport executes it.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), headers: Vec::new() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A parsed upstream response: status, best-effort-JSON body, and which
/// transport produced it (`request_type` is surfaced to analytics).
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
    pub request_type: &'static str,
}

/// Validate the content-type header and parse the body as JSON. A body that
/// fails to parse is treated as an empty JSON object, per spec §4.D; a
/// content-type that doesn't mention `json` is a hard `*.non_json` failure.
pub fn parse_json_body(
    content_type: Option<&str>,
    body: &[u8],
    non_json_code: &'static str,
) -> Result<Value, GatewayError> {
    let is_json = content_type.map(|ct| ct.to_ascii_lowercase().contains("json")).unwrap_or(false);
    if !is_json {
        return Err(GatewayError::error(non_json_code).with_status(502));
    }
    Ok(serde_json::from_slice(body).unwrap_or(Value::Object(Default::default())))
}

/// Default non-200 status triage shared across platforms; platform pipelines
/// may special-case particular statuses (e.g. Hytale's 401/403, Xbox's
/// in-body business errors) before or instead of calling this.
pub fn default_status_error(api_failure_code: &'static str, rate_limited_code: &'static str, status: u16) -> GatewayError {
    match status {
        429 => GatewayError::rate_limited(rate_limited_code),
        _ => GatewayError::error(api_failure_code).with_status(500).with_data(serde_json::json!({
            "upstream_status": status,
        })),
    }
}

pub fn timeout_error(api_failure_code: &'static str) -> GatewayError {
    GatewayError::error(api_failure_code)
        .with_status(500)
        .with_data(serde_json::json!({ "message": "upstream call timed out" }))
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const HYTALE_TIMEOUT: Duration = Duration::from_secs(10);
