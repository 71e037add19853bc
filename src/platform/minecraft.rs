//! Minecraft pipeline: username/UUID lookup against Mojang's services with
//! the raw-TLS → Fetch → off-box proxy → vendor API fallback chain (spec
//! §4.F "Minecraft").

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use super::{now_ms, spawn_cache_put, PlatformContext};
use crate::canonical::{self, MinecraftQuery};
use crate::error::{GatewayError, Result};
use crate::model::PlayerProfile;
use crate::transport::fetch::FetchTransport;
use crate::transport::raw_tls::RawTlsTransport;
use crate::transport::{default_status_error, UpstreamRequest, UpstreamResponse, DEFAULT_TIMEOUT};

const API_FAILURE: &str = "minecraft.api_failure";
const NON_JSON: &str = "minecraft.non_json";
const INVALID: &str = "minecraft.invalid_username";
const RATE_LIMITED: &str = "minecraft.rate_limited";

pub async fn lookup(ctx: &PlatformContext, query: &str) -> Result<PlayerProfile> {
    match canonical::canonicalize_minecraft(query)? {
        MinecraftQuery::ByUsername { name } => lookup_by_username(ctx, &name).await,
        MinecraftQuery::ProfileByUuid { raw } => lookup_by_uuid(ctx, &raw).await,
    }
}

async fn lookup_by_username(ctx: &PlatformContext, name: &str) -> Result<PlayerProfile> {
    let cache_key = canonical::cache_key("minecraft", "username", name);
    if let Some(profile) = ctx.cache.get::<PlayerProfile>(&cache_key).await {
        return Ok(profile);
    }

    let url = format!(
        "{}/minecraft/profile/lookup/name/{name}?date={}",
        ctx.upstreams.minecraft_services_base,
        now_ms()
    );
    let response = fetch_chain(ctx, "api.minecraftservices.com", url).await?;

    if response.status == 204 {
        return Err(GatewayError::fail(INVALID));
    }
    if response.status == 404 {
        let body_text = response.body.to_string();
        if body_text.contains("Couldn't find any profile with name") {
            return Err(GatewayError::fail(INVALID));
        }
    }
    if response.status != 200 {
        return Err(default_status_error(API_FAILURE, RATE_LIMITED, response.status));
    }

    let raw = response
        .body
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::fail(INVALID))?
        .to_ascii_lowercase();

    let profile = fetch_profile_by_uuid(ctx, &raw).await?;
    spawn_cache_put(ctx, cache_key, profile.clone(), ctx.cache_config.minecraft_persistent_ttl_secs);
    Ok(profile)
}

async fn lookup_by_uuid(ctx: &PlatformContext, raw: &str) -> Result<PlayerProfile> {
    fetch_profile_by_uuid(ctx, raw).await
}

async fn fetch_profile_by_uuid(ctx: &PlatformContext, raw: &str) -> Result<PlayerProfile> {
    let profile_cache_key = canonical::cache_key("minecraft", "profile", raw);
    if let Some(profile) = ctx.cache.get::<PlayerProfile>(&profile_cache_key).await {
        return Ok(profile);
    }

    let url = format!(
        "{}/session/minecraft/profile/{raw}?unsigned=false",
        ctx.upstreams.session_server_base
    );
    let response = fetch_chain(ctx, "sessionserver.mojang.com", url).await?;

    if response.status == 204 || response.status == 404 {
        return Err(GatewayError::fail(INVALID));
    }
    if response.status != 200 {
        return Err(default_status_error(API_FAILURE, RATE_LIMITED, response.status));
    }

    let profile = normalize(raw, &response.body);
    spawn_cache_put(ctx, profile_cache_key, profile.clone(), ctx.cache_config.minecraft_persistent_ttl_secs);
    let username_key = canonical::cache_key("minecraft", "username", &profile.username);
    spawn_cache_put(ctx, username_key, profile.clone(), ctx.cache_config.minecraft_persistent_ttl_secs);
    Ok(profile)
}

fn normalize(raw: &str, body: &Value) -> PlayerProfile {
    let username = body.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let properties = body.get("properties").and_then(Value::as_array).cloned();

    let mut skin_texture = None;
    if let Some(props) = &properties {
        for prop in props {
            if prop.get("name").and_then(Value::as_str) != Some("textures") {
                continue;
            }
            let Some(encoded) = prop.get("value").and_then(Value::as_str) else { continue };
            let Ok(decoded) = BASE64.decode(encoded) else { continue };
            let Ok(textures): std::result::Result<Value, _> = serde_json::from_slice(&decoded) else { continue };
            if let Some(url) = textures.pointer("/textures/SKIN/url").and_then(Value::as_str) {
                skin_texture = Some(url.to_string());
                break;
            }
        }
    }

    PlayerProfile {
        id: canonical::format_uuid_dashes(raw),
        raw_id: Some(raw.to_string()),
        username,
        avatar: format!("https://crafthead.net/avatar/{raw}"),
        skin_texture,
        cape_texture: None,
        properties,
        name_history: Some(Vec::new()),
        meta: HashMap::new(),
        cached_at: now_ms(),
    }
}

/// raw-TLS first, fall back to Fetch; on 429/403 from Fetch retry once
/// through the off-box proxy with the host rewritten; on 429 from the proxy
/// fall back once more to the vendor API keyed by `nodecraft_api_key`.
async fn fetch_chain(ctx: &PlatformContext, host: &str, url: String) -> Result<UpstreamResponse> {
    let req = UpstreamRequest::new(url.clone());

    if let Ok(resp) = RawTlsTransport::get(host, &req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE).await {
        return Ok(resp);
    }

    let fetch = FetchTransport::new(ctx.client.clone());
    let fetch_result = fetch.get(&req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE).await;

    let needs_proxy = matches!(&fetch_result, Ok(r) if r.status == 429 || r.status == 403);
    if !needs_proxy {
        return fetch_result;
    }

    let Some(proxy_base) = &ctx.upstreams.minecraft_proxy_url else {
        return fetch_result;
    };
    let proxied_url = rewrite_host(&url, proxy_base);
    let proxied_req = UpstreamRequest::new(proxied_url);
    let proxied = fetch.get(&proxied_req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE).await;

    match proxied {
        Ok(r) if r.status == 429 => vendor_fallback(ctx, &url).await,
        other => other,
    }
}

fn rewrite_host(url: &str, new_base: &str) -> String {
    let path = url.splitn(2, "://").nth(1).and_then(|rest| rest.find('/').map(|i| &rest[i..])).unwrap_or("/");
    format!("{}{}", new_base.trim_end_matches('/'), path)
}

async fn vendor_fallback(ctx: &PlatformContext, url: &str) -> Result<UpstreamResponse> {
    let Some(key) = &ctx.upstreams.nodecraft_api_key else {
        return Err(GatewayError::error(API_FAILURE).with_status(500));
    };
    let req = UpstreamRequest::new(url.to_string()).with_header("X-Api-Key", key.clone());
    FetchTransport::new(ctx.client.clone()).get(&req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_host_preserves_path_and_query() {
        assert_eq!(
            rewrite_host("https://api.minecraftservices.com/minecraft/profile/lookup/name/Foo?date=1", "https://proxy.example.com"),
            "https://proxy.example.com/minecraft/profile/lookup/name/Foo?date=1"
        );
    }
}
