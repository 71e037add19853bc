//! Agent message types
//!
//! Communication protocol between the Redis pool agent, the health monitor,
//! and the background worker. All messages derive `Clone`/`Debug` to satisfy
//! the `ActonMessage` blanket implementation. The health trio also derives
//! `Serialize` so `/health` can return the aggregated state directly.

use serde::Serialize;

/// Health status of a pool.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    #[default]
    Unhealthy,
    Connecting,
}

/// Broadcast sent by a pool agent whenever its health changes.
#[derive(Clone, Debug, Default)]
pub struct PoolHealthUpdate {
    pub pool_type: String,
    pub status: HealthStatus,
    pub message: String,
}

/// Query for the aggregated health of all registered pools.
#[derive(Clone, Debug, Default)]
pub struct GetAggregatedHealth;

/// Response containing aggregated health status from all pools.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AggregatedHealthResponse {
    pub overall_healthy: bool,
    pub components: Vec<ComponentHealth>,
}

/// Health status of a single component/pool.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
}

/// Internal message sent when the Redis pool connects successfully.
#[derive(Clone, Debug)]
pub(crate) struct RedisPoolConnected {
    pub pool: deadpool_redis::Pool,
}

/// Internal message sent when the Redis pool connection fails.
#[derive(Clone, Debug, Default)]
pub(crate) struct RedisPoolConnectionFailed {
    pub error: String,
}

// =============================================================================
// Background Worker Agent messages
// =============================================================================

/// Message to cancel a running background task.
#[derive(Clone, Debug, Default)]
pub struct CancelTask {
    pub task_id: String,
}

/// Message to query the status of a specific task.
#[derive(Clone, Debug, Default)]
pub struct GetTaskStatus {
    pub task_id: String,
}

/// Message to query the status of all tasks.
#[derive(Clone, Debug, Default)]
pub struct GetAllTaskStatuses;

/// Response containing task status information.
#[derive(Clone, Debug, Default)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: super::background_worker::TaskStatus,
}

/// Submit a new labeled unit of background work.
#[derive(Clone, Debug)]
pub(crate) struct SubmitTask {
    pub task_id: String,
    pub label: String,
}

/// Internal: a submitted task finished, successfully or not.
#[derive(Clone, Debug, Default)]
pub(crate) struct TaskFinished {
    pub task_id: String,
    pub error: Option<String>,
}
