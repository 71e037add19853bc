//! Per-platform lookup pipelines (spec §4.F): cache-first, canonicalize,
//! call upstream through the shared transport stack, normalize into
//! `PlayerProfile`, then fire-and-forget the result back into the cache.

pub mod hytale;
pub mod minecraft;
pub mod steam;
pub mod xbox;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::agents::BackgroundWorker;
use crate::cache::Cache;
use crate::config::{CacheConfig, UpstreamsConfig};
use crate::error::{GatewayError, Result};
use crate::hytale::HytaleManager;
use crate::model::{Platform, PlayerProfile};

/// Everything a platform pipeline needs, bundled so call sites don't carry a
/// five-argument parameter list.
#[derive(Clone)]
pub struct PlatformContext {
    pub client: reqwest::Client,
    pub cache: Cache,
    pub upstreams: Arc<UpstreamsConfig>,
    pub cache_config: Arc<CacheConfig>,
    pub background: BackgroundWorker,
    pub hytale: HytaleManager,
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// Fire-and-forget a cache write through the background worker so it survives
/// past the response that triggered it (spec §4.C, §5).
pub(crate) fn spawn_cache_put(ctx: &PlatformContext, key: String, player: PlayerProfile, ttl_secs: u64) {
    let cache = ctx.cache.clone();
    let task_id = format!("cache-put:{key}");
    ctx.background.submit("cache-put", task_id, move |_token| {
        Box::pin(async move {
            cache
                .put(&key, &player, std::time::Duration::from_secs(ttl_secs))
                .await;
            Ok(())
        })
    });
}

pub(crate) fn spawn_cache_put_negative(ctx: &PlatformContext, key: String, ttl_secs: u64) {
    let cache = ctx.cache.clone();
    let task_id = format!("cache-put-negative:{key}");
    ctx.background.submit("cache-put-negative", task_id, move |_token| {
        Box::pin(async move {
            let negative = crate::model::NegativeEntry::new();
            cache
                .put(&key, &negative, std::time::Duration::from_secs(ttl_secs))
                .await;
            Ok(())
        })
    });
}

/// Dispatch a lookup to the pipeline named by `platform`.
pub async fn lookup(ctx: &PlatformContext, platform: Platform, query: &str) -> Result<PlayerProfile> {
    match platform {
        Platform::Minecraft => minecraft::lookup(ctx, query).await,
        Platform::Steam => steam::lookup(ctx, query).await,
        Platform::Xbox => xbox::lookup(ctx, query).await,
        Platform::Hytale => hytale::lookup(ctx, query).await,
    }
}

pub(crate) fn unknown_upstream_shape(code: &'static str) -> GatewayError {
    GatewayError::error(code).with_status(500)
}
