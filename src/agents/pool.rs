//! Redis connection pool agent
//!
//! Owns the `deadpool_redis::Pool` behind a single-writer actor instead of an
//! `Arc<RwLock<Option<Pool>>>`. Connection happens once at startup with
//! retry/backoff (see `crate::cache::create_pool_with_retries`); once
//! established the pool handle is cheap to clone and handed out to callers
//! via a read-only query.

use acton_reactive::prelude::*;

use super::messages::{HealthStatus, PoolHealthUpdate, RedisPoolConnected, RedisPoolConnectionFailed};
use crate::config::RedisConfig;

/// Query for the current pool, if connected.
#[derive(Clone, Debug, Default)]
pub struct GetRedisPool;

#[derive(Clone, Debug, Default)]
pub struct RedisPoolResponse {
    pub pool: Option<deadpool_redis::Pool>,
}

/// State for the Redis pool agent.
#[derive(Debug, Default)]
pub struct RedisPoolState {
    pool: Option<deadpool_redis::Pool>,
    status: HealthStatus,
}

pub struct RedisPoolAgent;

impl RedisPoolAgent {
    /// Spawn the agent and kick off a background connection attempt.
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        config: RedisConfig,
        broker: AgentHandle,
    ) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<RedisPoolState>();

        agent.mutate_on::<RedisPoolConnected>(|agent, envelope| {
            let msg = envelope.message();
            agent.model.pool = Some(msg.pool.clone());
            agent.model.status = HealthStatus::Healthy;
            tracing::info!("redis pool connected");
            AgentReply::immediate()
        });

        agent.mutate_on::<RedisPoolConnectionFailed>(|agent, envelope| {
            let msg = envelope.message();
            agent.model.status = HealthStatus::Unhealthy;
            tracing::error!(error = %msg.error, "redis pool connection failed");
            AgentReply::immediate()
        });

        agent.act_on::<GetRedisPool>(|agent, envelope| {
            let pool = agent.model.pool.clone();
            let reply_envelope = envelope.reply_envelope();
            AgentReply::from_async(async move {
                reply_envelope.send(RedisPoolResponse { pool }).await;
            })
        });

        agent.handle().subscribe::<RedisPoolConnected>().await;
        agent.handle().subscribe::<RedisPoolConnectionFailed>().await;
        agent.handle().subscribe::<GetRedisPool>().await;

        let started = agent.start().await;

        let connect_handle = started.clone();
        tokio::spawn(async move {
            match crate::cache::create_pool_with_retries(&config).await {
                Ok(pool) => {
                    connect_handle
                        .send(RedisPoolConnected { pool })
                        .await;
                    broker
                        .send(PoolHealthUpdate {
                            pool_type: "redis".to_string(),
                            status: HealthStatus::Healthy,
                            message: "connected".to_string(),
                        })
                        .await;
                }
                Err(e) => {
                    connect_handle
                        .send(RedisPoolConnectionFailed { error: e.to_string() })
                        .await;
                    broker
                        .send(PoolHealthUpdate {
                            pool_type: "redis".to_string(),
                            status: HealthStatus::Unhealthy,
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        Ok(started)
    }
}
