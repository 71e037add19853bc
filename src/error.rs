//! Error taxonomy and HTTP response conversion
//!
//! Two tagged kinds share one wire shape: `fail` (expected, user-visible) and
//! `error` (unexpected/infrastructure). Both carry a stable `code`, a message
//! drawn from a single per-code table, optional structured `data`, and an
//! optional explicit HTTP `status`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The two error kinds from spec §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Fail,
    Error,
}

/// A tagged gateway error: `code`, message, optional structured `data`, optional explicit status.
#[derive(Debug, Clone, Error)]
#[error("{code}: {}", self.message())]
pub struct GatewayError {
    pub kind: Kind,
    pub code: &'static str,
    pub data: Option<Value>,
    pub status: Option<u16>,
}

/// The per-code message table. Both the constructor and the response envelope
/// consult this so the two call sites can never disagree.
fn default_message(code: &str) -> &'static str {
    match code {
        "api.404" => "not found",
        "api.unknown_error" => "an unexpected error occurred",
        "transport.codec_error" => "failed to parse upstream http response",

        "minecraft.invalid_username" => "invalid minecraft username or uuid",
        "minecraft.api_failure" => "minecraft upstream request failed",
        "minecraft.non_json" => "minecraft upstream returned a non-json response",
        "minecraft.rate_limited" => "minecraft upstream rate limit exceeded",

        "steam.invalid_id" => "invalid steam identifier",
        "steam.api_failure" => "steam upstream request failed",
        "steam.non_json" => "steam upstream returned a non-json response",
        "steam.rate_limited" => "steam upstream rate limit exceeded",

        "xbox.not_found" => "xbox player not found",
        "xbox.bad_response" => "xbox upstream returned an unrecognized business error",
        "xbox.bad_response_code" => "xbox upstream returned an unexpected status code",
        "xbox.rate_limited" => "xbox upstream rate limit exceeded",
        "xbox.api_failure" => "xbox upstream request failed",
        "xbox.non_json" => "xbox upstream returned a non-json response",

        "hytale.not_found" => "hytale player not found",
        "hytale.invalid_identifier" => "invalid hytale username or uuid",
        "hytale.auth_failure" => "hytale session authentication failed",
        "hytale.no_refresh_token" => "no hytale refresh token is configured",
        "hytale.no_profiles" => "hytale account has no profiles",
        "hytale.session_creation_failed" => "failed to create a hytale game session",
        "hytale.rate_limited" => "hytale session pool is rate limited",
        "hytale.api_failure" => "hytale upstream request failed",
        "hytale.non_json" => "hytale upstream returned a non-json response",

        _ => "an error occurred",
    }
}

impl GatewayError {
    pub fn fail(code: &'static str) -> Self {
        Self {
            kind: Kind::Fail,
            code,
            data: None,
            status: None,
        }
    }

    pub fn error(code: &'static str) -> Self {
        Self {
            kind: Kind::Error,
            code,
            data: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The effective message: `data.message` overrides the per-code default.
    pub fn message(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| default_message(self.code).to_string())
    }

    /// §7: explicit status first, then `api.404` -> 404, then `error` kind -> 500, else 400.
    pub fn status_code(&self) -> StatusCode {
        if let Some(status) = self.status {
            return StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        }
        if self.code == "api.404" {
            return StatusCode::NOT_FOUND;
        }
        match self.kind {
            Kind::Error => StatusCode::INTERNAL_SERVER_ERROR,
            Kind::Fail => StatusCode::BAD_REQUEST,
        }
    }

    /// `invalid_username` / `invalid_id` / `not_found` / `invalid_identifier` are user-visible
    /// fails and are not counted as errors for analytics accounting (spec §7).
    pub fn counts_as_error_for_analytics(&self) -> bool {
        self.kind == Kind::Error
    }

    pub fn not_found() -> Self {
        Self::fail("api.404").with_status(404)
    }

    pub fn unknown() -> Self {
        Self::error("api.unknown_error").with_status(500)
    }

    pub fn rate_limited(code: &'static str) -> Self {
        Self::error(code).with_status(429)
    }
}

/// Wire shape shared by success and failure responses.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: bool,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let envelope = ErrorEnvelope {
            success: false,
            error: self.kind == Kind::Error,
            code: self.code,
            message: self.message(),
            data: self.data.clone(),
        };

        if self.kind == Kind::Error {
            tracing::error!(code = self.code, status = %status, "gateway error");
        } else {
            tracing::warn!(code = self.code, status = %status, "gateway fail");
        }

        (status, Json(envelope)).into_response()
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(e: redis::RedisError) -> Self {
        GatewayError::error("api.unknown_error")
            .with_status(500)
            .with_data(serde_json::json!({ "message": format!("redis error: {e}") }))
    }
}

impl From<figment::Error> for GatewayError {
    fn from(e: figment::Error) -> Self {
        GatewayError::error("api.unknown_error")
            .with_status(500)
            .with_data(serde_json::json!({ "message": format!("configuration error: {e}") }))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::error("api.unknown_error")
            .with_status(500)
            .with_data(serde_json::json!({ "message": format!("http client error: {e}") }))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::error("api.unknown_error")
            .with_status(500)
            .with_data(serde_json::json!({ "message": format!("i/o error: {e}") }))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_precedence_follows_spec_7() {
        assert_eq!(
            GatewayError::fail("minecraft.invalid_username").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::error("xbox.api_failure").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::rate_limited("xbox.rate_limited").status_code(),
            StatusCode::from_u16(429).unwrap()
        );
    }

    #[test]
    fn data_message_overrides_default() {
        let err = GatewayError::error("xbox.bad_response_code")
            .with_data(serde_json::json!({ "message": "custom", "upstream_status": 500 }));
        assert_eq!(err.message(), "custom");
    }

    #[test]
    fn default_message_used_when_absent() {
        let err = GatewayError::fail("steam.invalid_id");
        assert_eq!(err.message(), "invalid steam identifier");
    }

    #[test]
    fn fail_kinds_do_not_count_for_analytics() {
        assert!(!GatewayError::fail("hytale.not_found").counts_as_error_for_analytics());
        assert!(GatewayError::error("hytale.auth_failure").counts_as_error_for_analytics());
    }
}
