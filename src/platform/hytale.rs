//! Hytale pipeline: session-token-backed profile lookup with the raw-TLS →
//! Fetch → container-proxy → vendor-API fallback chain, 401/403
//! invalidate-and-retry, and 429 reporting back to the session pool manager
//! (spec §4.F "Hytale", §4.G).

use std::collections::HashMap;

use serde_json::Value;

use super::{now_ms, spawn_cache_put, PlatformContext};
use crate::canonical::{self, HytaleQuery};
use crate::error::{GatewayError, Result};
use crate::model::PlayerProfile;
use crate::transport::fetch::FetchTransport;
use crate::transport::proxy::ProxyTransport;
use crate::transport::raw_tls::RawTlsTransport;
use crate::transport::{UpstreamRequest, UpstreamResponse, HYTALE_TIMEOUT};

const API_FAILURE: &str = "hytale.api_failure";
const NON_JSON: &str = "hytale.non_json";
const NOT_FOUND: &str = "hytale.not_found";

pub async fn lookup(ctx: &PlatformContext, query: &str) -> Result<PlayerProfile> {
    let canonical_query = canonical::canonicalize_hytale(query)?;
    let query_key = canonical::cache_key("hytale", "query", query);
    if let Some(profile) = ctx.cache.get::<PlayerProfile>(&query_key).await {
        return Ok(profile);
    }

    let profile = fetch_with_retry(ctx, &canonical_query).await?;

    spawn_cache_put(ctx, query_key, profile.clone(), ctx.cache_config.hytale_persistent_ttl_secs);
    let uuid_key = canonical::cache_key("hytale", "uuid", &profile.id);
    if uuid_key != canonical::cache_key("hytale", "query", query) {
        spawn_cache_put(ctx, uuid_key, profile.clone(), ctx.cache_config.hytale_persistent_ttl_secs);
    }
    let username_key = canonical::cache_key("hytale", "username", &profile.username);
    if username_key != canonical::cache_key("hytale", "query", query) && username_key != canonical::cache_key("hytale", "uuid", &profile.id)
    {
        spawn_cache_put(ctx, username_key, profile.clone(), ctx.cache_config.hytale_persistent_ttl_secs);
    }

    Ok(profile)
}

async fn fetch_with_retry(ctx: &PlatformContext, query: &HytaleQuery) -> Result<PlayerProfile> {
    let session = ctx.hytale.get_session_token(false).await?;
    match fetch_profile(ctx, query, &session).await {
        Err(e) if is_auth_error(&e) => {
            ctx.hytale.invalidate_tokens().await;
            let fresh_session = ctx.hytale.get_session_token(true).await?;
            fetch_profile(ctx, query, &fresh_session).await
        }
        other => other,
    }
}

fn is_auth_error(err: &GatewayError) -> bool {
    err.code == "hytale.auth_failure"
}

async fn fetch_profile(ctx: &PlatformContext, query: &HytaleQuery, session: &str) -> Result<PlayerProfile> {
    let path = match query {
        HytaleQuery::Username(name) => format!("/profile/username/{name}"),
        HytaleQuery::Uuid(uuid) => format!("/profile/uuid/{uuid}"),
    };
    let url = format!("{}{path}", ctx.upstreams.hytale_api_base);

    let response = call_chain(ctx, &url, session).await?;

    if response.status == 401 || response.status == 403 {
        return Err(GatewayError::error("hytale.auth_failure").with_status(500));
    }
    if response.status == 429 {
        ctx.hytale.report_rate_limit(session).await;
        return Err(GatewayError::rate_limited("hytale.rate_limited"));
    }
    if response.status == 404 {
        return Err(GatewayError::fail(NOT_FOUND));
    }
    if response.status != 200 {
        return Err(GatewayError::error(API_FAILURE).with_status(500));
    }

    Ok(normalize(&response.body))
}

/// raw-TLS first; on any non-terminal failure fall back to Fetch; if Fetch
/// yields a rate-limited or generic upstream error fall back to the
/// container proxy using a different session where possible; finally the
/// vendor API with the container's session token carried in the query.
async fn call_chain(ctx: &PlatformContext, url: &str, session: &str) -> Result<UpstreamResponse> {
    let req = UpstreamRequest::new(url.to_string()).with_header("Authorization", format!("Bearer {session}"));

    if let Ok(resp) = RawTlsTransport::get("account-data.hytale.com", &req, HYTALE_TIMEOUT, NON_JSON, API_FAILURE).await {
        return Ok(resp);
    }

    let fetch = FetchTransport::new(ctx.client.clone());
    let fetch_result = fetch.get(&req, HYTALE_TIMEOUT, NON_JSON, API_FAILURE).await;

    let needs_proxy = matches!(&fetch_result, Ok(r) if r.status == 429 || r.status >= 500) || fetch_result.is_err();
    if !needs_proxy {
        return fetch_result;
    }
    if ctx.upstreams.hytale_proxy_urls.is_empty() {
        return fetch_result;
    }

    let container_session = ctx.hytale.get_session_token_for_container().await.unwrap_or_else(|_| session.to_string());
    let proxy_req = UpstreamRequest::new(url.to_string())
        .with_header("Authorization", format!("Bearer {container_session}"));
    let proxy = ProxyTransport::new(&fetch);
    let proxied = proxy.call(&ctx.upstreams.hytale_proxy_urls, &proxy_req, NON_JSON, API_FAILURE).await;

    match proxied {
        Ok(r) => Ok(r),
        Err(_) => vendor_fallback(ctx, url, &container_session).await,
    }
}

async fn vendor_fallback(ctx: &PlatformContext, url: &str, session: &str) -> Result<UpstreamResponse> {
    let separator = if url.contains('?') { "&" } else { "?" };
    let vendor_url = format!("{url}{separator}session={session}");
    let req = UpstreamRequest::new(vendor_url);
    FetchTransport::new(ctx.client.clone()).get(&req, HYTALE_TIMEOUT, NON_JSON, API_FAILURE).await
}

fn normalize(body: &Value) -> PlayerProfile {
    let uuid = body.get("uuid").and_then(Value::as_str).unwrap_or_default().to_string();
    let username = body.get("username").and_then(Value::as_str).unwrap_or_default().to_string();
    let skin = body.get("skin").cloned();

    let mut meta: HashMap<String, Value> = HashMap::new();
    if let Some(obj) = body.as_object() {
        for (k, v) in obj {
            if k == "uuid" || k == "username" || k == "skin" {
                continue;
            }
            meta.insert(k.clone(), v.clone());
        }
    }
    if let Some(skin) = &skin {
        meta.insert("skin".to_string(), skin.clone());
    }

    PlayerProfile {
        id: uuid.clone(),
        raw_id: Some(canonical::strip_dashes(&uuid)),
        username,
        avatar: format!("https://crafthead.net/hytale/avatar/{uuid}"),
        skin_texture: None,
        cape_texture: None,
        properties: None,
        name_history: Some(Vec::new()),
        meta,
        cached_at: now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_auth_error_matches_only_auth_failure_code() {
        assert!(is_auth_error(&GatewayError::error("hytale.auth_failure")));
        assert!(!is_auth_error(&GatewayError::error("hytale.api_failure")));
    }

    #[test]
    fn normalize_carries_skin_into_meta() {
        let body = serde_json::json!({ "uuid": "abc", "username": "Steve", "skin": { "url": "x" } });
        let profile = normalize(&body);
        assert_eq!(profile.username, "Steve");
        assert_eq!(profile.avatar, "https://crafthead.net/hytale/avatar/abc");
        assert!(profile.meta.contains_key("skin"));
    }
}
