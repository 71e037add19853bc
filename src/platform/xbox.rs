//! Xbox pipeline: XUID/gamertag lookup against the Xbox Live proxy API,
//! including its body-embedded business errors and negative-result caching
//! (spec §4.F "Xbox").

use std::collections::HashMap;

use serde_json::Value;

use super::{now_ms, spawn_cache_put, spawn_cache_put_negative, unknown_upstream_shape, PlatformContext};
use crate::canonical::{self, XboxQuery};
use crate::error::{GatewayError, Result};
use crate::model::{NegativeEntry, PlayerProfile};
use crate::transport::fetch::FetchTransport;
use crate::transport::{UpstreamRequest, DEFAULT_TIMEOUT};

const API_FAILURE: &str = "xbox.api_failure";
const NON_JSON: &str = "xbox.non_json";
const NOT_FOUND: &str = "xbox.not_found";

pub async fn lookup(ctx: &PlatformContext, query: &str) -> Result<PlayerProfile> {
    let query_key = canonical::cache_key("xbox", "query", query);

    if let Some(negative) = ctx.cache.get::<NegativeEntry>(&query_key).await {
        if negative.not_found {
            return Err(GatewayError::fail(NOT_FOUND));
        }
    }
    if let Some(profile) = ctx.cache.get::<PlayerProfile>(&query_key).await {
        return Ok(profile);
    }

    let Some(api_key) = &ctx.upstreams.xbox_api_key else {
        return Err(GatewayError::error(API_FAILURE).with_status(500));
    };

    let canonical_query = canonical::canonicalize_xbox(query);
    let url = match &canonical_query {
        XboxQuery::Xuid(xuid) => format!("{}/account/{xuid}", ctx.upstreams.xbox_api_base),
        XboxQuery::Gamertag(name) => format!("{}/friends/search?gt={name}", ctx.upstreams.xbox_api_base),
    };

    let req = UpstreamRequest::new(url).with_header("X-Authorization", api_key.clone());
    let response = FetchTransport::new(ctx.client.clone())
        .get(&req, DEFAULT_TIMEOUT, NON_JSON, API_FAILURE)
        .await?;

    if response.status == 429 {
        return Err(GatewayError::rate_limited("xbox.rate_limited"));
    }
    if response.status != 200 {
        return Err(GatewayError::error("xbox.bad_response_code")
            .with_status(500)
            .with_data(serde_json::json!({ "upstream_status": response.status })));
    }

    if let (Some(code), Some(description)) = (
        response.body.get("code").and_then(Value::as_i64),
        response.body.get("description").and_then(Value::as_str),
    ) {
        if code == 2 || code == 28 {
            spawn_cache_put_negative(ctx, query_key, ctx.cache_config.xbox_negative_ttl_secs);
            return Err(GatewayError::fail(NOT_FOUND));
        }
        return Err(unknown_upstream_shape("xbox.bad_response").with_data(serde_json::json!({
            "error_code": code,
            "description": description,
        })));
    }

    let settings = response
        .body
        .pointer("/profileUsers/0/settings")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let profile = normalize(settings);

    spawn_cache_put(ctx, query_key.clone(), profile.clone(), ctx.cache_config.xbox_persistent_ttl_secs);
    if profile.id != query.to_ascii_lowercase() {
        let xuid_key = canonical::cache_key("xbox", "query", &profile.id);
        spawn_cache_put(ctx, xuid_key, profile.clone(), ctx.cache_config.xbox_persistent_ttl_secs);
    }

    Ok(profile)
}

fn normalize(settings: Vec<Value>) -> PlayerProfile {
    let mut by_id: HashMap<&str, &str> = HashMap::new();
    for setting in &settings {
        if let (Some(id), Some(value)) = (
            setting.get("id").and_then(Value::as_str),
            setting.get("value").and_then(Value::as_str),
        ) {
            by_id.insert(id, value);
        }
    }

    let gamertag = by_id.get("Gamertag").copied();
    let unique_modern = by_id.get("UniqueModernGamertag").copied();
    let modern = by_id.get("ModernGamertag").copied();
    let modern_suffix = by_id.get("ModernGamertagSuffix").copied();

    let mut meta: HashMap<String, Value> = HashMap::new();
    for (id, value) in &by_id {
        if matches!(
            *id,
            "Gamertag" | "GameDisplayPicRaw" | "UniqueModernGamertag" | "ModernGamertag" | "ModernGamertagSuffix"
        ) {
            continue;
        }
        meta.insert(camel_case(id), Value::String(value.to_string()));
    }

    let username = gamertag
        .or(unique_modern)
        .or(modern)
        .or_else(|| meta.get("realName").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let avatar = by_id
        .get("GameDisplayPicRaw")
        .map(|raw| strip_avatar_query(raw))
        .unwrap_or_else(|| format!("https://avatar-ssl.xboxlive.com/avatar/{username}/avatarpic-l.png"));

    if let Some(unique) = unique_modern {
        meta.insert("uniqueModernGamertag".to_string(), Value::String(unique.to_string()));
    }
    if let Some(modern) = modern {
        meta.insert("modernGamertag".to_string(), Value::String(modern.to_string()));
    }
    if let Some(suffix) = modern_suffix {
        meta.insert("modernGamertagSuffix".to_string(), Value::String(suffix.to_string()));
    }

    let xuid = by_id.get("XboxUserId").copied().unwrap_or("").to_string();

    PlayerProfile {
        id: xuid,
        raw_id: None,
        username,
        avatar,
        skin_texture: None,
        cape_texture: None,
        properties: None,
        name_history: Some(Vec::new()),
        meta,
        cached_at: now_ms(),
    }
}

/// Strip `mode=Padding` and force `h`/`w` to 180 on the avatar URL's query string.
fn strip_avatar_query(raw: &str) -> String {
    let Some((base, query)) = raw.split_once('?') else {
        return raw.to_string();
    };
    let kept: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.starts_with("mode=") && !pair.starts_with("h=") && !pair.starts_with("w="))
        .map(String::from)
        .collect();
    let mut parts = kept;
    parts.push("h=180".to_string());
    parts.push("w=180".to_string());
    format!("{base}?{}", parts.join("&"))
}

fn camel_case(pascal: &str) -> String {
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_lowercases_first_letter_only() {
        assert_eq!(camel_case("RealName"), "realName");
    }

    #[test]
    fn normalize_falls_back_through_gamertag_chain() {
        let settings = vec![
            serde_json::json!({ "id": "UniqueModernGamertag", "value": "Jimbo#1234" }),
            serde_json::json!({ "id": "XboxUserId", "value": "2533274818672308" }),
        ];
        let profile = normalize(settings);
        assert_eq!(profile.username, "Jimbo#1234");
        assert_eq!(profile.id, "2533274818672308");
    }

    #[test]
    fn avatar_query_forces_180_dimensions() {
        let url = strip_avatar_query("https://images-eds.xboxlive.com/img?mode=Padding&h=64&w=64");
        assert!(url.contains("h=180"));
        assert!(url.contains("w=180"));
        assert!(!url.contains("mode=Padding"));
    }
}
