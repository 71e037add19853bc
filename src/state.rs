//! Application state: the wiring between the cache, the upstream transport
//! client, the Hytale session manager, the background worker, and the
//! analytics sink that every handler and middleware layer shares.

use std::sync::Arc;

use acton_reactive::prelude::AgentHandle;

use crate::analytics::Analytics;
use crate::config::Config;
use crate::platform::PlatformContext;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub platform: PlatformContext,
    pub analytics: Analytics,
    pub health: AgentHandle,
}
