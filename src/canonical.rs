//! Per-platform identifier canonicalization (spec §4.E)
//!
//! Each canonicalizer classifies the inbound path segment into the upstream
//! query shape the platform pipeline needs, and yields the cache key role
//! (`<platform>-<role>-<lowercase identifier>`) used both for cache lookups
//! and upstream queries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GatewayError;

static MINECRAFT_ALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w-]+$").unwrap());
static XBOX_XUID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,16}$").unwrap());
static HYTALE_USERNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w{3,16}$").unwrap());
static HYTALE_UUID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\da-f]{8}(-?[\da-f]{4}){3}-?[\da-f]{12}$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinecraftQuery {
    ProfileByUuid { raw: String },
    ByUsername { name: String },
}

pub fn canonicalize_minecraft(query: &str) -> Result<MinecraftQuery, GatewayError> {
    if !MINECRAFT_ALLOWED.is_match(query) {
        return Err(invalid("minecraft.invalid_username"));
    }
    match query.len() {
        32 => Ok(MinecraftQuery::ProfileByUuid { raw: query.to_ascii_lowercase() }),
        36 => Ok(MinecraftQuery::ProfileByUuid {
            raw: strip_dashes(&query.to_ascii_lowercase()),
        }),
        _ => Ok(MinecraftQuery::ByUsername { name: query.to_string() }),
    }
}

pub fn strip_dashes(uuid: &str) -> String {
    uuid.chars().filter(|c| *c != '-').collect()
}

pub fn format_uuid_dashes(raw: &str) -> String {
    if raw.len() != 32 {
        return raw.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &raw[0..8],
        &raw[8..12],
        &raw[12..16],
        &raw[16..20],
        &raw[20..32]
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XboxQuery {
    Xuid(String),
    Gamertag(String),
}

pub fn canonicalize_xbox(query: &str) -> XboxQuery {
    if XBOX_XUID.is_match(query) {
        XboxQuery::Xuid(query.to_string())
    } else {
        XboxQuery::Gamertag(query.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HytaleQuery {
    Uuid(String),
    Username(String),
}

pub fn canonicalize_hytale(query: &str) -> Result<HytaleQuery, GatewayError> {
    if HYTALE_UUID.is_match(query) {
        Ok(HytaleQuery::Uuid(query.to_ascii_lowercase()))
    } else if HYTALE_USERNAME.is_match(query) {
        Ok(HytaleQuery::Username(query.to_string()))
    } else {
        Err(invalid("hytale.invalid_identifier"))
    }
}

fn invalid(code: &'static str) -> GatewayError {
    GatewayError::fail(code)
}

/// Build a cache key of the canonical `<platform>-<role>-<lowercase id>` shape.
pub fn cache_key(platform: &str, role: &str, identifier: &str) -> String {
    format!("{platform}-{role}-{}", identifier.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minecraft_classifies_raw_and_dashed_uuid() {
        assert_eq!(
            canonicalize_minecraft("ef6134805b6244e4a4467fbe85d65513").unwrap(),
            MinecraftQuery::ProfileByUuid { raw: "ef6134805b6244e4a4467fbe85d65513".to_string() }
        );
        assert_eq!(
            canonicalize_minecraft("ef613480-5b62-44e4-a446-7fbe85d65513").unwrap(),
            MinecraftQuery::ProfileByUuid { raw: "ef6134805b6244e4a4467fbe85d65513".to_string() }
        );
    }

    #[test]
    fn minecraft_classifies_username() {
        assert_eq!(
            canonicalize_minecraft("CherryJimbo").unwrap(),
            MinecraftQuery::ByUsername { name: "CherryJimbo".to_string() }
        );
    }

    #[test]
    fn minecraft_rejects_invalid_characters() {
        assert!(canonicalize_minecraft("cherryjimbo@example.com").is_err());
    }

    #[test]
    fn uuid_dash_round_trip() {
        let raw = "ef6134805b6244e4a4467fbe85d65513";
        let dashed = format_uuid_dashes(raw);
        assert_eq!(dashed, "ef613480-5b62-44e4-a446-7fbe85d65513");
        assert_eq!(strip_dashes(&dashed), raw);
    }

    #[test]
    fn xbox_classifies_xuid_vs_gamertag() {
        assert_eq!(canonicalize_xbox("2533274818672308"), XboxQuery::Xuid("2533274818672308".to_string()));
        assert_eq!(canonicalize_xbox("Jimboodude"), XboxQuery::Gamertag("Jimboodude".to_string()));
        assert_eq!(
            canonicalize_xbox("2533274818672320z"),
            XboxQuery::Gamertag("2533274818672320z".to_string())
        );
    }

    #[test]
    fn hytale_classifies_uuid_vs_username() {
        assert!(matches!(
            canonicalize_hytale("d290f1ee-6c54-4b01-90e6-d701748f0851").unwrap(),
            HytaleQuery::Uuid(_)
        ));
        assert!(matches!(canonicalize_hytale("Steve").unwrap(), HytaleQuery::Username(_)));
        assert!(canonicalize_hytale("ab").is_err());
    }
}
