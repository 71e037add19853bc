//! Configuration management using Figment
//!
//! Layered highest to lowest precedence: environment variables (the bare
//! upstream-credential names spec'd in spec.md §6, plus `GATEWAY_`-prefixed
//! gateway-native settings), a `config.toml` in the working directory, and
//! built-in defaults.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub upstreams: UpstreamsConfig,
    #[serde(default)]
    pub hytale: HytaleConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Overall per-request deadline (spec §5 suggests 10s).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            environment: default_environment(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            max_connections: default_redis_max_connections(),
            connection_timeout_secs: default_connection_timeout(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Per-platform upstream base URLs, credentials, and proxy pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamsConfig {
    #[serde(default = "default_minecraft_services_base")]
    pub minecraft_services_base: String,
    #[serde(default = "default_session_server_base")]
    pub session_server_base: String,
    /// Off-box proxy URL used for the Minecraft HTTP fallback chain.
    #[serde(default)]
    pub minecraft_proxy_url: Option<String>,
    #[serde(default)]
    pub nodecraft_api_key: Option<String>,

    #[serde(default = "default_steam_api_base")]
    pub steam_api_base: String,
    /// Up to four Steam API keys; one is chosen uniformly at random per call.
    #[serde(default)]
    pub steam_api_keys: Vec<String>,

    #[serde(default = "default_xbox_api_base")]
    pub xbox_api_base: String,
    #[serde(default)]
    pub xbox_api_key: Option<String>,

    #[serde(default = "default_hytale_api_base")]
    pub hytale_api_base: String,
    /// Up to three container proxies used for the Hytale container-proxy transport.
    #[serde(default)]
    pub hytale_proxy_urls: Vec<String>,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_hytale_call_timeout_secs")]
    pub hytale_call_timeout_secs: u64,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            minecraft_services_base: default_minecraft_services_base(),
            session_server_base: default_session_server_base(),
            minecraft_proxy_url: None,
            nodecraft_api_key: None,
            steam_api_base: default_steam_api_base(),
            steam_api_keys: Vec::new(),
            xbox_api_base: default_xbox_api_base(),
            xbox_api_key: None,
            hytale_api_base: default_hytale_api_base(),
            hytale_proxy_urls: Vec::new(),
            call_timeout_secs: default_call_timeout_secs(),
            hytale_call_timeout_secs: default_hytale_call_timeout_secs(),
        }
    }
}

impl UpstreamsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn hytale_call_timeout(&self) -> Duration {
        Duration::from_secs(self.hytale_call_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HytaleConfig {
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub profile_uuid: Option<String>,
    #[serde(default = "default_hytale_oauth_base")]
    pub oauth_base: String,
    #[serde(default = "default_session_pool_min")]
    pub session_pool_min: usize,
    #[serde(default = "default_session_pool_max")]
    pub session_pool_max: usize,
}

impl Default for HytaleConfig {
    fn default() -> Self {
        Self {
            refresh_token: None,
            profile_uuid: None,
            oauth_base: default_hytale_oauth_base(),
            session_pool_min: default_session_pool_min(),
            session_pool_max: default_session_pool_max(),
        }
    }
}

impl HytaleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session_pool_min == 0 || self.session_pool_max == 0 {
            return Err(crate::error::GatewayError::error("api.unknown_error")
                .with_status(500)
                .with_data(serde_json::json!({
                    "message": "hytale session pool bounds must be positive integers"
                })));
        }
        if self.session_pool_min > self.session_pool_max {
            return Err(crate::error::GatewayError::error("api.unknown_error")
                .with_status(500)
                .with_data(serde_json::json!({
                    "message": "hytale session pool min must not exceed max"
                })));
        }
        Ok(())
    }
}

/// Cache TTLs per spec §3, plus the global bypass switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_false")]
    pub bypass_cache: bool,

    #[serde(default = "ttl_7_days")]
    pub minecraft_persistent_ttl_secs: u64,
    #[serde(default = "ttl_7_days")]
    pub steam_persistent_ttl_secs: u64,
    #[serde(default = "ttl_7_days")]
    pub xbox_persistent_ttl_secs: u64,
    #[serde(default = "ttl_10_days")]
    pub hytale_persistent_ttl_secs: u64,

    #[serde(default = "ttl_5_days")]
    pub edge_ttl_secs: u64,

    #[serde(default = "ttl_1_hour")]
    pub xbox_negative_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bypass_cache: false,
            minecraft_persistent_ttl_secs: ttl_7_days(),
            steam_persistent_ttl_secs: ttl_7_days(),
            xbox_persistent_ttl_secs: ttl_7_days(),
            hytale_persistent_ttl_secs: ttl_10_days(),
            edge_ttl_secs: ttl_5_days(),
            xbox_negative_ttl_secs: ttl_1_hour(),
        }
    }
}

/// External telemetry sink. Left unset, writes are logged rather than shipped,
/// so the service runs standalone without the external analytics collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub sink_endpoint: Option<String>,
    #[serde(default = "default_dataset_name")]
    pub dataset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
    #[serde(default = "default_true")]
    pub catch_panic: bool,
    #[serde(default = "default_true")]
    pub compression: bool,
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
    #[serde(default)]
    pub request_tracking: RequestTrackingConfig,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            body_limit_mb: default_body_limit_mb(),
            catch_panic: true,
            compression: true,
            cors_mode: default_cors_mode(),
            request_tracking: RequestTrackingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    #[serde(default = "default_true")]
    pub request_id_enabled: bool,
    #[serde(default = "default_true")]
    pub propagate_headers: bool,
    #[serde(default = "default_true")]
    pub mask_sensitive_headers: bool,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            request_id_enabled: true,
            propagate_headers: true,
            mask_sensitive_headers: true,
        }
    }
}

fn default_service_name() -> String {
    "playerid-gateway".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_environment() -> String {
    "dev".to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_redis_max_connections() -> usize {
    20
}
fn default_connection_timeout() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_delay() -> u64 {
    2
}
fn default_minecraft_services_base() -> String {
    "https://api.minecraftservices.com".to_string()
}
fn default_session_server_base() -> String {
    "https://sessionserver.mojang.com".to_string()
}
fn default_steam_api_base() -> String {
    "https://api.steampowered.com".to_string()
}
fn default_xbox_api_base() -> String {
    "https://xbl.io/api/v2".to_string()
}
fn default_hytale_api_base() -> String {
    "https://account-data.hytale.com".to_string()
}
fn default_hytale_oauth_base() -> String {
    "https://auth.hytale.com".to_string()
}
fn default_call_timeout_secs() -> u64 {
    5
}
fn default_hytale_call_timeout_secs() -> u64 {
    10
}
fn default_session_pool_min() -> usize {
    1
}
fn default_session_pool_max() -> usize {
    10
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}
fn default_body_limit_mb() -> usize {
    1
}
fn default_cors_mode() -> String {
    "permissive".to_string()
}
fn default_dataset_name() -> String {
    "playerid_gateway".to_string()
}
fn ttl_7_days() -> u64 {
    7 * 24 * 3600
}
fn ttl_10_days() -> u64 {
    10 * 24 * 3600
}
fn ttl_5_days() -> u64 {
    5 * 24 * 3600
}
fn ttl_1_hour() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            redis: RedisConfig::default(),
            upstreams: UpstreamsConfig::default(),
            hytale: HytaleConfig::default(),
            cache: CacheConfig::default(),
            analytics: AnalyticsConfig::default(),
            middleware: MiddlewareConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `config.toml` (if present) and the environment.
    ///
    /// Environment variables take the bare names spec'd in spec.md §6
    /// (`XBOX_APIKEY`, `STEAM_APIKEY`..`STEAM_APIKEY4`, `NODECRAFT_API_KEY`,
    /// `HYTALE_REFRESH_TOKEN`, `HYTALE_PROFILE_UUID`, `HYTALE_SESSION_POOL_MIN`,
    /// `HYTALE_SESSION_POOL_MAX`, `BYPASS_CACHE`) layered over `GATEWAY_`-prefixed
    /// gateway-native settings, both with higher precedence than the TOML file.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        let path = std::path::Path::new("config.toml");
        if path.exists() {
            tracing::info!("loading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .merge(Env::raw().only(&["XBOX_APIKEY"]).map(|_| "upstreams.xbox_api_key".into()))
            .merge(
                Env::raw()
                    .only(&["NODECRAFT_API_KEY"])
                    .map(|_| "upstreams.nodecraft_api_key".into()),
            )
            .merge(
                Env::raw()
                    .only(&["HYTALE_REFRESH_TOKEN"])
                    .map(|_| "hytale.refresh_token".into()),
            )
            .merge(
                Env::raw()
                    .only(&["HYTALE_PROFILE_UUID"])
                    .map(|_| "hytale.profile_uuid".into()),
            )
            .merge(
                Env::raw()
                    .only(&["HYTALE_SESSION_POOL_MIN"])
                    .map(|_| "hytale.session_pool_min".into()),
            )
            .merge(
                Env::raw()
                    .only(&["HYTALE_SESSION_POOL_MAX"])
                    .map(|_| "hytale.session_pool_max".into()),
            )
            .merge(
                Env::raw()
                    .only(&["BYPASS_CACHE"])
                    .map(|_| "cache.bypass_cache".into()),
            );

        let mut config: Config = figment.extract()?;

        let mut steam_keys: Vec<String> = Vec::new();
        if let Ok(k) = std::env::var("STEAM_APIKEY") {
            steam_keys.push(k);
        }
        for n in 2..=4 {
            if let Ok(k) = std::env::var(format!("STEAM_APIKEY{n}")) {
                steam_keys.push(k);
            }
        }
        if !steam_keys.is_empty() {
            config.upstreams.steam_api_keys = steam_keys;
        }

        config.hytale.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.hytale.session_pool_min, 1);
        assert_eq!(config.hytale.session_pool_max, 10);
        assert_eq!(config.cache.xbox_negative_ttl_secs, 3600);
        assert_eq!(config.cache.hytale_persistent_ttl_secs, 10 * 24 * 3600);
        assert!(!config.cache.bypass_cache);
    }

    #[test]
    fn hytale_bounds_validation_rejects_zero_and_inverted() {
        let mut c = HytaleConfig::default();
        c.session_pool_min = 0;
        assert!(c.validate().is_err());

        c.session_pool_min = 5;
        c.session_pool_max = 2;
        assert!(c.validate().is_err());

        c.session_pool_max = 5;
        assert!(c.validate().is_ok());
    }
}
