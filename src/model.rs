//! Shared data model: player profiles, cache records, and the Hytale token store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Platform a lookup is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Minecraft,
    Steam,
    Xbox,
    Hytale,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Minecraft => "minecraft",
            Platform::Steam => "steam",
            Platform::Xbox => "xbox",
            Platform::Hytale => "hytale",
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minecraft" => Ok(Platform::Minecraft),
            "steam" => Ok(Platform::Steam),
            "xbox" => Ok(Platform::Xbox),
            "hytale" => Ok(Platform::Hytale),
            _ => Err(()),
        }
    }
}

/// Uniform player profile returned by every platform pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Platform primary id (formatted with separators where the platform convention has them).
    pub id: String,

    /// Separator-free form of `id`, where applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,

    pub username: String,

    pub avatar: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skin_texture: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cape_texture: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<Value>>,

    /// Legacy field kept for client compatibility; always empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_history: Option<Vec<Value>>,

    pub meta: HashMap<String, Value>,

    pub cached_at: i64,
}

/// Persistent-store representation: a profile plus the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub player: PlayerProfile,
}

/// Xbox-only sentinel marking a definitive "not found" result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeEntry {
    pub not_found: bool,
}

impl NegativeEntry {
    pub fn new() -> Self {
        Self { not_found: true }
    }
}

impl Default for NegativeEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// A single Hytale game session, bearer token pair plus its availability window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_token: String,
    pub identity_token: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
    /// Epoch milliseconds; absent means the session is not rate-limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_until: Option<i64>,
}

impl SessionInfo {
    /// A session is usable as long as it has at least 5 minutes of life left.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms + 5 * 60 * 1000
    }

    pub fn is_available(&self, now_ms: i64) -> bool {
        self.is_valid(now_ms) && self.rate_limited_until.map(|t| t <= now_ms).unwrap_or(true)
    }
}

/// The single stored record owned by the Hytale token/session pool manager.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tokens {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch milliseconds of the last observed refresh-token rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_rotated_at: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_uuid: Option<String>,

    #[serde(default)]
    pub sessions: Vec<SessionInfo>,
    #[serde(default)]
    pub next_session_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rate_limit_seen: Option<i64>,

    // Legacy single-session fields, migrated into `sessions` on first load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_token_expires_at: Option<i64>,
}

impl Tokens {
    /// Lift a legacy single-session record into the pool, once.
    pub fn migrate_legacy(&mut self) {
        if self.sessions.is_empty() {
            if let (Some(session_token), Some(identity_token)) =
                (self.session_token.take(), self.identity_token.take())
            {
                let expires_at = self.identity_token_expires_at.take().unwrap_or(0);
                self.sessions.push(SessionInfo {
                    session_token,
                    identity_token,
                    expires_at,
                    rate_limited_until: None,
                });
            }
        }
        self.session_token = None;
        self.identity_token = None;
        self.identity_token_expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_validity_window() {
        let now = 1_000_000;
        let s = SessionInfo {
            session_token: "s".into(),
            identity_token: "i".into(),
            expires_at: now + 4 * 60 * 1000,
            rate_limited_until: None,
        };
        assert!(!s.is_valid(now));

        let s2 = SessionInfo {
            expires_at: now + 6 * 60 * 1000,
            ..s
        };
        assert!(s2.is_valid(now));
        assert!(s2.is_available(now));
    }

    #[test]
    fn legacy_migration_lifts_single_session() {
        let mut tokens = Tokens {
            session_token: Some("tok".into()),
            identity_token: Some("id".into()),
            identity_token_expires_at: Some(123),
            ..Default::default()
        };
        tokens.migrate_legacy();
        assert_eq!(tokens.sessions.len(), 1);
        assert_eq!(tokens.sessions[0].session_token, "tok");
        assert!(tokens.session_token.is_none());
    }

    #[test]
    fn platform_round_trips_through_str() {
        let p: Platform = "xbox".parse().unwrap();
        assert_eq!(p.as_str(), "xbox");
        assert!("nonsense".parse::<Platform>().is_err());
    }
}
