//! The "Fetch" transport: a regular HTTPS client call via `reqwest`.

use std::time::Duration;

use super::{parse_json_body, timeout_error, UpstreamRequest, UpstreamResponse};
use crate::error::GatewayError;

#[derive(Clone)]
pub struct FetchTransport {
    client: reqwest::Client,
}

impl FetchTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn get(
        &self,
        req: &UpstreamRequest,
        timeout: Duration,
        non_json_code: &'static str,
        api_failure_code: &'static str,
    ) -> Result<UpstreamResponse, GatewayError> {
        let mut builder = self.client.get(&req.url).timeout(timeout);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }

        let response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| timeout_error(api_failure_code))?
            .map_err(GatewayError::from)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(GatewayError::from)?;

        let body = parse_json_body(content_type.as_deref(), &bytes, non_json_code)?;

        Ok(UpstreamResponse { status, body, request_type: "fetch" })
    }

    /// Same as `get` but for the off-box proxy's own POST call; kept
    /// separate so proxy-specific headers never leak into the plain path.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
        non_json_code: &'static str,
        api_failure_code: &'static str,
    ) -> Result<UpstreamResponse, GatewayError> {
        let response = tokio::time::timeout(timeout, self.client.post(url).json(body).timeout(timeout).send())
            .await
            .map_err(|_| timeout_error(api_failure_code))?
            .map_err(GatewayError::from)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(GatewayError::from)?;
        let body = parse_json_body(content_type.as_deref(), &bytes, non_json_code)?;

        Ok(UpstreamResponse { status, body, request_type: "container" })
    }
}
