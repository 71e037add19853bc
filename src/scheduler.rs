//! Periodic Hytale token rotation (spec §4.I): once an hour, nudge the
//! session manager to refresh a near-expiry refresh token and shrink the
//! session pool if it's been idle.

use std::time::Duration;

use crate::hytale::HytaleManager;

const TICK_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawns the background tick and returns immediately; the task runs for the
/// lifetime of the process.
pub fn spawn(hytale: HytaleManager) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            interval.tick().await;
            if let Err(err) = hytale.proactive_refresh().await {
                tracing::warn!(%err, "proactive hytale token refresh failed");
            }
        }
    });
}
