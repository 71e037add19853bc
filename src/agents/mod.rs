//! Agent-based components
//!
//! Reactive, actor-based alternatives to lock-and-option connection state:
//! a single-writer Redis pool agent, a health monitor aggregating broadcast
//! health updates, and a background-task registry that tracks fire-and-forget
//! work (cache writes, analytics) so it survives past the response that
//! triggered it.

mod background_worker;
mod health;
mod messages;
mod pool;

pub mod prelude {
    pub use acton_reactive::prelude::*;

    pub use super::messages::{
        AggregatedHealthResponse, ComponentHealth, GetAggregatedHealth, HealthStatus,
        PoolHealthUpdate,
    };

    pub use super::background_worker::{BackgroundWorker, TaskStatus};
    pub use super::health::{HealthMonitorAgent, HealthMonitorState};
    pub use super::pool::{RedisPoolAgent, RedisPoolState};
}

pub use messages::{AggregatedHealthResponse, ComponentHealth, GetAggregatedHealth, HealthStatus};

pub use background_worker::{BackgroundWorker, TaskStatus};
pub use health::{HealthMonitorAgent, HealthMonitorState};
pub use pool::{RedisPoolAgent, RedisPoolState};
