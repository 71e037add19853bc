//! Steam pipeline: vanity URL resolution, SteamID conversion, and
//! `GetPlayerSummaries` lookup (spec §4.F "Steam").

use std::collections::HashMap;

use rand::Rng;
use serde_json::Value;

use super::{now_ms, spawn_cache_put, PlatformContext};
use crate::canonical;
use crate::error::{GatewayError, Result};
use crate::model::PlayerProfile;
use crate::steamid::{self, SteamId64};
use crate::transport::fetch::FetchTransport;
use crate::transport::{UpstreamRequest, DEFAULT_TIMEOUT};

const API_FAILURE: &str = "steam.api_failure";
const NON_JSON: &str = "steam.non_json";
const INVALID: &str = "steam.invalid_id";

pub async fn lookup(ctx: &PlatformContext, query: &str) -> Result<PlayerProfile> {
    let query_key = canonical::cache_key("steam", "query", query);
    if let Some(profile) = ctx.cache.get::<PlayerProfile>(&query_key).await {
        return Ok(profile);
    }

    let steam_id = resolve_steam_id(ctx, query).await?;
    let id_key = canonical::cache_key("steam", "id", &steam_id.to_steam64_string());
    if let Some(profile) = ctx.cache.get::<PlayerProfile>(&id_key).await {
        spawn_cache_put(ctx, query_key, profile.clone(), ctx.cache_config.steam_persistent_ttl_secs);
        return Ok(profile);
    }

    let key = pick_api_key(ctx)?;
    let url = format!(
        "{}/ISteamUser/GetPlayerSummaries/v2/?key={key}&steamids={}",
        ctx.upstreams.steam_api_base,
        steam_id.to_steam64_string()
    );
    let req = UpstreamRequest::new(url);
    let response = FetchTransport::new(ctx.client.clone())
        .get(&req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE)
        .await?;

    if response.status == 429 {
        return Err(GatewayError::rate_limited("steam.rate_limited"));
    }
    if response.status != 200 {
        return Err(GatewayError::error(API_FAILURE).with_status(500));
    }

    let players = response
        .body
        .pointer("/response/players")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let player = players.first().ok_or_else(|| GatewayError::fail(INVALID))?;

    let profile = normalize(steam_id, player);
    spawn_cache_put(ctx, query_key, profile.clone(), ctx.cache_config.steam_persistent_ttl_secs);
    spawn_cache_put(ctx, id_key, profile.clone(), ctx.cache_config.steam_persistent_ttl_secs);
    Ok(profile)
}

async fn resolve_steam_id(ctx: &PlatformContext, query: &str) -> Result<SteamId64> {
    if let Some(id) = steamid::parse(query) {
        return Ok(id);
    }

    if let Ok(key) = pick_api_key(ctx) {
        let url = format!(
            "{}/ISteamUser/ResolveVanityURL/v1/?key={key}&vanityurl={query}",
            ctx.upstreams.steam_api_base
        );
        let req = UpstreamRequest::new(url);
        if let Ok(response) = FetchTransport::new(ctx.client.clone()).get(&req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE).await {
            if let Some(resolved) = response.body.pointer("/response/steamid").and_then(Value::as_str) {
                if let Some(id) = steamid::parse(resolved) {
                    return Ok(id);
                }
            }
        }
    }

    Err(GatewayError::fail(INVALID))
}

fn pick_api_key(ctx: &PlatformContext) -> Result<String> {
    if ctx.upstreams.steam_api_keys.is_empty() {
        return Err(GatewayError::error(API_FAILURE).with_status(500));
    }
    let idx = rand::rng().random_range(0..ctx.upstreams.steam_api_keys.len());
    Ok(ctx.upstreams.steam_api_keys[idx].clone())
}

fn normalize(steam_id: SteamId64, player: &Value) -> PlayerProfile {
    let mut meta: HashMap<String, Value> = HashMap::new();
    if let Value::Object(map) = player {
        for (k, v) in map {
            meta.insert(k.clone(), v.clone());
        }
    }
    meta.insert("steam2id".to_string(), Value::String(steam_id.to_steam2()));
    meta.insert("steam2id_new".to_string(), Value::String(steam_id.to_steam2().replacen("STEAM_0", "STEAM_1", 1)));
    meta.insert("steam3id".to_string(), Value::String(steam_id.to_steam3()));
    meta.insert("steam64id".to_string(), Value::String(steam_id.to_steam64_string()));

    PlayerProfile {
        id: steam_id.to_steam64_string(),
        raw_id: None,
        username: player.get("personaname").and_then(Value::as_str).unwrap_or_default().to_string(),
        avatar: player.get("avatarfull").and_then(Value::as_str).unwrap_or_default().to_string(),
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
    fn normalize_fills_meta_identity_fields() {
        let steam_id = SteamId64(76561198047699606);
        let player = serde_json::json!({ "personaname": "jimbo", "avatarfull": "http://x/a.jpg" });
        let profile = normalize(steam_id, &player);
        assert_eq!(profile.id, "76561198047699606");
        assert_eq!(profile.username, "jimbo");
        assert_eq!(profile.meta.get("steam3id").unwrap(), "[U:1:87433878]");
    }
}
