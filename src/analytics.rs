//! Analytics sink (spec §4.J): ordered-column `write_point` writer.
//!
//! The sink itself is an external telemetry collaborator, referenced only by
//! interface (spec.md §2's out-of-scope list). When no endpoint is
//! configured the point is logged instead of shipped, so the gateway runs
//! standalone in development.

use axum::http::HeaderMap;
use serde::Serialize;

use crate::agents::BackgroundWorker;
use crate::config::AnalyticsConfig;

const ANONYMIZED_PREFIX: &str = "Tiers ";
const ANONYMIZE_MARKER: &str = "played by ";

/// Per-request context pulled once from headers, independent of the lookup outcome.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub url: String,
    pub user_agent: String,
    pub referer: String,
    pub protocol: String,
    pub city: String,
    pub colo: String,
    pub country: String,
    pub tls_version: String,
    pub asn: u32,
}

impl RequestMeta {
    pub fn from_headers(url: &str, headers: &HeaderMap) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();

        let colo = header("cf-ray").rsplit_once('-').map(|(_, colo)| colo.to_string()).unwrap_or_default();

        Self {
            url: url.to_string(),
            user_agent: anonymize_user_agent(&header("user-agent")),
            referer: header("referer"),
            protocol: header("x-forwarded-proto"),
            city: header("cf-ipcity"),
            colo,
            country: header("cf-ipcountry"),
            tls_version: header("cf-tls-version"),
            asn: header("cf-asn").parse().unwrap_or(0),
        }
    }
}

/// `Tiers ... played by <name>...` is truncated right after the marker so the
/// player name that follows it never reaches the sink.
fn anonymize_user_agent(raw: &str) -> String {
    if raw.starts_with(ANONYMIZED_PREFIX) {
        if let Some(idx) = raw.find(ANONYMIZE_MARKER) {
            return raw[..idx + ANONYMIZE_MARKER.len()].to_string();
        }
    }
    raw.to_string()
}

/// Fields the caller supplies per spec §4.J's `write_point(ctx, {...})`; the
/// rest of the record comes from `RequestMeta`.
pub struct PointInput {
    pub point_type: &'static str,
    pub error: bool,
    pub request_type: String,
    pub cached: bool,
    pub status: u16,
    pub response_time_ms: u64,
}

/// Column order is part of the external contract (spec §4.J) - do not reorder fields.
#[derive(Debug, Serialize)]
struct AnalyticsRecord {
    #[serde(rename = "type")]
    point_type: &'static str,
    error: bool,
    request_type: String,
    url: String,
    user_agent: String,
    referer: String,
    protocol: String,
    city: String,
    colo: String,
    country: String,
    tls_version: String,
    asn: u32,
    cached: u8,
    response_time_ms: u64,
    status: u16,
}

#[derive(Clone)]
pub struct Analytics {
    client: reqwest::Client,
    config: AnalyticsConfig,
    background: BackgroundWorker,
}

impl Analytics {
    pub fn new(client: reqwest::Client, config: AnalyticsConfig, background: BackgroundWorker) -> Self {
        Self { client, config, background }
    }

    /// Fire-and-forget a single point; must outlive the response that triggered it (spec §5).
    pub fn write_point(&self, meta: RequestMeta, input: PointInput) {
        let record = AnalyticsRecord {
            point_type: input.point_type,
            error: input.error,
            request_type: input.request_type,
            url: meta.url,
            user_agent: meta.user_agent,
            referer: meta.referer,
            protocol: meta.protocol,
            city: meta.city,
            colo: meta.colo,
            country: meta.country,
            tls_version: meta.tls_version,
            asn: meta.asn,
            cached: if input.cached { 1 } else { 0 },
            response_time_ms: input.response_time_ms,
            status: input.status,
        };

        let client = self.client.clone();
        let endpoint = self.config.sink_endpoint.clone();
        let dataset = self.config.dataset.clone();
        let task_id = format!("analytics-write:{}:{}:{}", record.point_type, record.status, record.response_time_ms);

        self.background.submit("analytics-write", task_id, move |_token| {
            Box::pin(async move {
                match endpoint {
                    Some(url) => {
                        let _ = client.post(&url).query(&[("dataset", dataset.as_str())]).json(&record).send().await;
                    }
                    None => {
                        tracing::info!(
                            target: "analytics",
                            r#type = record.point_type,
                            error = record.error,
                            request_type = %record.request_type,
                            url = %record.url,
                            cached = record.cached,
                            status = record.status,
                            response_time_ms = record.response_time_ms,
                            "analytics point"
                        );
                    }
                }
                Ok(())
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymizes_tiers_user_agent_at_played_by_marker() {
        let raw = "Tiers proxy v2 played by SomePlayerName extra trailing info";
        assert_eq!(anonymize_user_agent(raw), "Tiers proxy v2 played by ");
    }

    #[test]
    fn leaves_ordinary_user_agent_untouched() {
        assert_eq!(anonymize_user_agent("Mozilla/5.0"), "Mozilla/5.0");
    }

    #[test]
    fn extracts_colo_from_cf_ray_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ray", "7d2f1e6f8c1e2f3a-SJC".parse().unwrap());
        let meta = RequestMeta::from_headers("/api/player/minecraft/jimbo", &headers);
        assert_eq!(meta.colo, "SJC");
    }
}
