use std::sync::Arc;

use acton_reactive::prelude::ActonApp;

use playerid_gateway::agents::{BackgroundWorker, HealthMonitorAgent, RedisPoolAgent};
use playerid_gateway::analytics::Analytics;
use playerid_gateway::cache::Cache;
use playerid_gateway::config::Config;
use playerid_gateway::hytale::HytaleManager;
use playerid_gateway::observability::init_tracing;
use playerid_gateway::platform::PlatformContext;
use playerid_gateway::server::Server;
use playerid_gateway::state::AppState;
use playerid_gateway::{router, scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;
    config.hytale.validate()?;

    let client = reqwest::Client::new();
    let pool = playerid_gateway::cache::create_pool_with_retries(&config.redis).await?;
    let cache = Cache::new(pool, config.cache.bypass_cache);

    let mut runtime = ActonApp::launch();

    let background = BackgroundWorker::spawn(&mut runtime).await?;
    let health = HealthMonitorAgent::spawn(&mut runtime).await?;
    // Reports Redis connectivity into the health monitor; the gateway's own
    // reads/writes go through `cache`, connected independently above.
    RedisPoolAgent::spawn(&mut runtime, config.redis.clone(), health.clone()).await?;
    let hytale = HytaleManager::spawn(
        &mut runtime,
        config.hytale.clone(),
        config.upstreams.clone(),
        client.clone(),
        cache.clone(),
    )
    .await?;

    let analytics = Analytics::new(client.clone(), config.analytics.clone(), background.clone());

    let platform = PlatformContext {
        client,
        cache,
        upstreams: Arc::new(config.upstreams.clone()),
        cache_config: Arc::new(config.cache.clone()),
        background,
        hytale: hytale.clone(),
    };

    let state = AppState {
        config: Arc::new(config.clone()),
        platform,
        analytics,
        health,
    };

    scheduler::spawn(hytale);

    let app = router::build(state);
    let result = Server::new(config).serve(app).await;

    tracing::info!("shutting down agent runtime");
    if let Err(err) = runtime.shutdown_all().await {
        tracing::warn!(%err, "agent runtime shutdown reported an error");
    }

    result.map_err(anyhow::Error::from)
}
