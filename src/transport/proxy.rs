//! Off-box proxy transport: POST `{url, headers}` to a proxy instance that
//! issues the GET from its own IP and pipes the response back verbatim
//! (spec §4.D.3, §6 "Off-box proxy protocol").

use std::time::Duration;

use rand::Rng;
use serde_json::json;

use super::fetch::FetchTransport;
use super::UpstreamRequest;
use crate::error::GatewayError;

pub const PROXY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProxyTransport<'a> {
    fetch: &'a FetchTransport,
}

impl<'a> ProxyTransport<'a> {
    pub fn new(fetch: &'a FetchTransport) -> Self {
        Self { fetch }
    }

    /// Pick one proxy uniformly at random and forward `req` through it.
    pub async fn call(
        &self,
        proxy_urls: &[String],
        req: &UpstreamRequest,
        non_json_code: &'static str,
        api_failure_code: &'static str,
    ) -> Result<super::UpstreamResponse, GatewayError> {
        let proxy_url = pick_random(proxy_urls)
            .ok_or_else(|| GatewayError::error(api_failure_code).with_status(500))?;

        let headers: serde_json::Map<String, serde_json::Value> = req
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();

        let body = json!({ "url": req.url, "headers": headers });
        let endpoint = format!("{}/proxy", proxy_url.trim_end_matches('/'));

        self.fetch
            .post_json(&endpoint, &body, PROXY_TIMEOUT, non_json_code, api_failure_code)
            .await
    }
}

fn pick_random(urls: &[String]) -> Option<String> {
    if urls.is_empty() {
        return None;
    }
    let idx = rand::rng().random_range(0..urls.len());
    Some(urls[idx].clone())
}
