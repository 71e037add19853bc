//! Hytale OAuth token + game-session pool manager (spec §4.G)
//!
//! The only process-wide mutable object. All reads and writes of `Tokens`
//! pass through a single critical section: a `tokio::sync::Mutex` wrapping
//! the state, re-checked for freshness immediately after acquiring the lock
//! so a stampede of callers collapses into a single refresh. Spec §9
//! explicitly allows this (mutex + in-memory cache) as an alternative to a
//! pure message-passing owner task; an `acton_reactive` agent wraps it
//! purely for lifecycle logging and health broadcast, consistent with the
//! other pool agents.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use acton_reactive::prelude::*;
use tokio::sync::Mutex;

use super::messages::{SessionPoolHealth, SessionRateLimited};
use crate::cache::Cache;
use crate::config::{HytaleConfig, UpstreamsConfig};
use crate::error::{GatewayError, Result};
use crate::model::{SessionInfo, Tokens};

const TOKENS_KEY: &str = "tokens";
const SESSION_VALID_SLACK_MS: i64 = 5 * 60 * 1000;
const RATE_LIMIT_COOLDOWN_MS: i64 = 60 * 1000;
const SHRINK_IDLE_MS: i64 = 10 * 60 * 1000;
const REFRESH_TOKEN_MAX_AGE_MS: i64 = 23 * 24 * 3600 * 1000;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

struct Inner {
    tokens: Mutex<Tokens>,
    config: HytaleConfig,
    upstreams: UpstreamsConfig,
    client: reqwest::Client,
    cache: Cache,
    agent: AgentHandle,
}

#[derive(Clone)]
pub struct HytaleManager {
    inner: Arc<Inner>,
}

impl HytaleManager {
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        config: HytaleConfig,
        upstreams: UpstreamsConfig,
        client: reqwest::Client,
        cache: Cache,
    ) -> anyhow::Result<Self> {
        let mut agent = runtime.new_agent::<()>();

        agent.mutate_on::<SessionPoolHealth>(|_agent, envelope| {
            let health = envelope.message();
            tracing::debug!(
                pool_size = health.pool_size,
                valid_sessions = health.valid_sessions,
                "hytale session pool health"
            );
            AgentReply::immediate()
        });

        agent.mutate_on::<SessionRateLimited>(|_agent, envelope| {
            let msg = envelope.message();
            tracing::warn!(token_suffix = %msg.token_suffix, "hytale session rate limited");
            AgentReply::immediate()
        });

        agent.after_start(|_agent| {
            tracing::info!("hytale token manager started");
            AgentReply::immediate()
        });

        agent.handle().subscribe::<SessionPoolHealth>().await;
        agent.handle().subscribe::<SessionRateLimited>().await;
        let handle = agent.start().await;

        let mut tokens = cache.get::<Tokens>(TOKENS_KEY).await.unwrap_or_default();
        tokens.migrate_legacy();
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = config.refresh_token.clone();
        }
        if tokens.profile_uuid.is_none() {
            tokens.profile_uuid = config.profile_uuid.clone();
        }
        Ok(Self {
            inner: Arc::new(Inner {
                tokens: Mutex::new(tokens),
                config,
                upstreams,
                client,
                cache,
                agent: handle,
            }),
        })
    }

    /// Ensure the pool has at least `min_pool` sessions, then return the next
    /// available one by round-robin.
    pub async fn get_session_token(&self, force: bool) -> Result<String> {
        let mut tokens = self.inner.tokens.lock().await;
        self.ensure_access_token(&mut tokens, force).await?;
        self.ensure_min_pool(&mut tokens).await?;
        let session = self.next_session_selection(&mut tokens).await?;
        self.persist(&tokens).await;
        Ok(session.session_token)
    }

    /// Return a valid, non-rate-limited session for the container proxy path;
    /// if all sessions are rate-limited, return the one whose cooldown is
    /// closest to expiring.
    pub async fn get_session_token_for_container(&self) -> Result<String> {
        let mut tokens = self.inner.tokens.lock().await;
        self.ensure_access_token(&mut tokens, false).await?;
        self.ensure_min_pool(&mut tokens).await?;

        let now = now_ms();
        if let Some(session) = tokens.sessions.iter().find(|s| s.is_available(now)) {
            return Ok(session.session_token.clone());
        }
        let oldest = tokens
            .sessions
            .iter()
            .filter(|s| s.is_valid(now))
            .min_by_key(|s| s.rate_limited_until.unwrap_or(0));

        match oldest {
            Some(s) => Ok(s.session_token.clone()),
            None => Err(GatewayError::error("hytale.rate_limited").with_status(429)),
        }
    }

    pub async fn report_rate_limit(&self, token: &str) {
        let mut tokens = self.inner.tokens.lock().await;
        let now = now_ms();
        let mut found = false;
        for session in tokens.sessions.iter_mut() {
            if session.session_token == token {
                session.rate_limited_until = Some(now + RATE_LIMIT_COOLDOWN_MS);
                found = true;
            }
        }
        tokens.last_rate_limit_seen = Some(now);
        let _ = self.expand(&mut tokens).await;
        self.persist(&tokens).await;
        drop(tokens);

        if found {
            let suffix: String = token.chars().rev().take(6).collect();
            self.inner
                .agent
                .send(SessionRateLimited { token_suffix: suffix })
                .await;
        }
    }

    pub async fn invalidate_tokens(&self) {
        let mut tokens = self.inner.tokens.lock().await;
        tokens.access_token = None;
        tokens.access_token_expires_at = None;
        tokens.sessions.clear();
        tokens.next_session_index = 0;
        self.persist(&tokens).await;
    }

    pub async fn reset_all_tokens(&self) {
        let mut tokens = self.inner.tokens.lock().await;
        *tokens = Tokens::default();
        self.persist(&tokens).await;
    }

    /// Called by the scheduled-rotation tick: refresh a near-expiry refresh
    /// token and shrink the pool if it's been idle.
    pub async fn proactive_refresh(&self) -> Result<()> {
        let mut tokens = self.inner.tokens.lock().await;
        let now = now_ms();
        let age = tokens
            .refresh_token_rotated_at
            .map(|t| now - t)
            .unwrap_or(REFRESH_TOKEN_MAX_AGE_MS);
        if age >= REFRESH_TOKEN_MAX_AGE_MS {
            self.ensure_access_token(&mut tokens, true).await?;
        }
        self.shrink(&mut tokens);
        self.persist(&tokens).await;

        self.inner
            .agent
            .send(SessionPoolHealth {
                pool_size: tokens.sessions.len(),
                valid_sessions: tokens.sessions.iter().filter(|s| s.is_valid(now)).count(),
            })
            .await;
        Ok(())
    }

    // ---- internal algorithms, all called with `tokens` already locked ----

    async fn ensure_access_token(&self, tokens: &mut Tokens, force: bool) -> Result<()> {
        let now = now_ms();
        if !force {
            if let Some(expires_at) = tokens.access_token_expires_at {
                if now + SESSION_VALID_SLACK_MS < expires_at {
                    return Ok(());
                }
            }
        }

        let refresh_token = tokens
            .refresh_token
            .clone()
            .or_else(|| self.inner.config.refresh_token.clone())
            .ok_or_else(|| GatewayError::error("hytale.no_refresh_token").with_status(500))?;

        let url = format!("{}/oauth2/token", self.inner.config.oauth_base);
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });

        let result = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .timeout(self.inner.upstreams.hytale_call_timeout())
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(_) => {
                if tokens.refresh_token.as_deref() == Some(refresh_token.as_str()) {
                    tokens.refresh_token = None;
                }
                return Err(GatewayError::error("hytale.auth_failure").with_status(500));
            }
        };

        if !response.status().is_success() {
            if tokens.refresh_token.as_deref() == Some(refresh_token.as_str()) {
                tokens.refresh_token = None;
            }
            return Err(GatewayError::error("hytale.auth_failure").with_status(500));
        }

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let access_token = payload
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::error("hytale.auth_failure").with_status(500))?
            .to_string();
        let expires_in = payload.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        tokens.access_token = Some(access_token);
        tokens.access_token_expires_at = Some(now + expires_in * 1000);

        if let Some(new_refresh) = payload.get("refresh_token").and_then(|v| v.as_str()) {
            if Some(new_refresh) != tokens.refresh_token.as_deref() {
                tokens.refresh_token = Some(new_refresh.to_string());
                tokens.refresh_token_rotated_at = Some(now);
            }
        }

        Ok(())
    }

    async fn profile_uuid(&self, tokens: &mut Tokens) -> Result<String> {
        if let Some(uuid) = &self.inner.config.profile_uuid {
            return Ok(uuid.clone());
        }
        if let Some(uuid) = &tokens.profile_uuid {
            return Ok(uuid.clone());
        }

        let access_token = tokens
            .access_token
            .clone()
            .ok_or_else(|| GatewayError::error("hytale.auth_failure").with_status(500))?;
        let url = format!("{}/my-account/get-profiles", self.inner.upstreams.hytale_api_base);
        let response = self
            .inner
            .client
            .get(&url)
            .bearer_auth(access_token)
            .timeout(self.inner.upstreams.hytale_call_timeout())
            .send()
            .await
            .map_err(|_| GatewayError::error("hytale.api_failure").with_status(500))?;

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let uuid = payload
            .get("profiles")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p| p.get("uuid"))
            .and_then(|u| u.as_str())
            .ok_or_else(|| GatewayError::fail("hytale.no_profiles").with_status(404))?
            .to_string();

        tokens.profile_uuid = Some(uuid.clone());
        Ok(uuid)
    }

    async fn session_refresh(&self, access_token: &str, session: &SessionInfo) -> Option<SessionInfo> {
        let url = format!("{}/game-session/refresh", self.inner.upstreams.hytale_api_base);
        let response = self
            .inner
            .client
            .post(&url)
            .bearer_auth(&session.session_token)
            .timeout(self.inner.upstreams.hytale_call_timeout())
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let payload: serde_json::Value = response.json().await.ok()?;
        let session_token = payload.get("session")?.as_str()?.to_string();
        let identity_token = payload.get("identity")?.as_str()?.to_string();
        let expires_at = payload
            .get("expiresAt")
            .and_then(|v| v.as_i64())
            .unwrap_or(now_ms() + 3600 * 1000);
        let _ = access_token;

        Some(SessionInfo { session_token, identity_token, expires_at, rate_limited_until: None })
    }

    async fn session_creation(&self, access_token: &str, profile_uuid: &str) -> Result<SessionInfo> {
        let url = format!("{}/game-session/new", self.inner.upstreams.hytale_api_base);
        let response = self
            .inner
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "uuid": profile_uuid }))
            .timeout(self.inner.upstreams.hytale_call_timeout())
            .send()
            .await
            .map_err(|_| GatewayError::error("hytale.session_creation_failed").with_status(500))?;

        let payload: serde_json::Value = response.json().await.unwrap_or_default();
        let session_token = payload
            .get("sessionToken")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::error("hytale.session_creation_failed").with_status(500))?
            .to_string();
        let identity_token = payload
            .get("identityToken")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::error("hytale.session_creation_failed").with_status(500))?
            .to_string();
        let expires_at = payload
            .get("expiresAt")
            .and_then(|v| v.as_i64())
            .unwrap_or(now_ms() + 3600 * 1000);

        Ok(SessionInfo { session_token, identity_token, expires_at, rate_limited_until: None })
    }

    async fn ensure_min_pool(&self, tokens: &mut Tokens) -> Result<()> {
        let now = now_ms();
        let min = self.inner.config.session_pool_min;

        let (mut valid, expired): (Vec<SessionInfo>, Vec<SessionInfo>) =
            tokens.sessions.drain(..).partition(|s| s.is_valid(now));

        let access_token = tokens.access_token.clone();
        if let Some(access_token) = &access_token {
            for expired_session in expired {
                if valid.len() >= min {
                    break;
                }
                if let Some(refreshed) = self.session_refresh(access_token, &expired_session).await {
                    valid.push(refreshed);
                }
            }
        }

        let mut created_any = !valid.is_empty();
        if valid.len() < min {
            let profile_uuid = self.profile_uuid(tokens).await?;
            let access_token = tokens
                .access_token
                .clone()
                .ok_or_else(|| GatewayError::error("hytale.auth_failure").with_status(500))?;
            while valid.len() < min {
                match self.session_creation(&access_token, &profile_uuid).await {
                    Ok(session) => {
                        valid.push(session);
                        created_any = true;
                    }
                    Err(e) => {
                        if valid.is_empty() && !created_any {
                            tokens.sessions = valid;
                            return Err(e);
                        }
                        break;
                    }
                }
            }
        }

        tokens.sessions = valid;
        if tokens.next_session_index >= tokens.sessions.len() {
            tokens.next_session_index = 0;
        }

        // A partial pool (below `min`) is not a success: callers rely on
        // `ensure_min_pool` returning `Ok` only when at least `min` valid
        // sessions are actually available.
        if tokens.sessions.len() < min {
            return Err(GatewayError::error("hytale.session_creation_failed").with_status(500));
        }
        Ok(())
    }

    async fn next_session_selection(&self, tokens: &mut Tokens) -> Result<SessionInfo> {
        let now = now_ms();
        let len = tokens.sessions.len();
        if len == 0 {
            return Err(GatewayError::error("hytale.rate_limited").with_status(429));
        }

        for offset in 0..len {
            let idx = (tokens.next_session_index + offset) % len;
            if tokens.sessions[idx].is_available(now) {
                tokens.next_session_index = (idx + 1) % len;
                return Ok(tokens.sessions[idx].clone());
            }
        }

        if self.expand(tokens).await.is_ok() {
            if let Some(last) = tokens.sessions.last().cloned() {
                tokens.next_session_index = 0;
                return Ok(last);
            }
        }

        Err(GatewayError::rate_limited("hytale.rate_limited"))
    }

    async fn expand(&self, tokens: &mut Tokens) -> Result<()> {
        if tokens.sessions.len() >= self.inner.config.session_pool_max {
            return Err(GatewayError::error("hytale.rate_limited").with_status(429));
        }
        let profile_uuid = self.profile_uuid(tokens).await?;
        let access_token = tokens
            .access_token
            .clone()
            .ok_or_else(|| GatewayError::error("hytale.auth_failure").with_status(500))?;
        let session = self.session_creation(&access_token, &profile_uuid).await?;
        tokens.sessions.push(session);
        Ok(())
    }

    fn shrink(&self, tokens: &mut Tokens) {
        let now = now_ms();
        let idle_long_enough = tokens
            .last_rate_limit_seen
            .map(|t| now - t >= SHRINK_IDLE_MS)
            .unwrap_or(true);
        if !idle_long_enough {
            return;
        }
        let min = self.inner.config.session_pool_min;
        if tokens.sessions.len() > min {
            tokens.sessions.truncate(min);
            tokens.next_session_index = 0;
        }
    }

    async fn persist(&self, tokens: &Tokens) {
        self.inner.cache.put_forever(TOKENS_KEY, tokens).await;
    }
}
