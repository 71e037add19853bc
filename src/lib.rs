//! # playerid-gateway
//!
//! A player-identity lookup gateway: given a platform (`minecraft`, `steam`,
//! `xbox`, `hytale`) and a query (username or id), resolve a uniform
//! [`model::PlayerProfile`] through a cache-first pipeline, proxying to each
//! platform's upstream API on a miss.
//!
//! ## Example
//!
//! ```rust,no_run
//! use playerid_gateway::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod error;
pub mod httpcodec;
pub mod hytale;
pub mod ids;
pub mod middleware;
pub mod model;
pub mod observability;
pub mod platform;
pub mod router;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod steamid;
pub mod transport;

pub mod health;

/// Internal agent-based components: the Redis pool monitor, the aggregated
/// health agent, and the background-task registry that tracks fire-and-forget
/// work (cache writes, analytics) so it survives past the response that
/// triggered it.
pub mod agents;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{GatewayError, Result};
    pub use crate::model::{Platform, PlayerProfile};
    pub use crate::observability::init_tracing;
    pub use crate::server::Server;
    pub use crate::state::AppState;

    pub use crate::agents::{AggregatedHealthResponse, BackgroundWorker, HealthStatus, TaskStatus};

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::get,
        Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use tracing::{debug, error, info, instrument, trace, warn};
    pub use acton_reactive::prelude::*;
}
