//! Broadcast messages the token/session pool manager emits for observability.
//! The critical section itself lives behind a `tokio::sync::Mutex` in
//! `manager::HytaleManager` (spec §9 explicitly allows either a mutex or a
//! message-passing owner task); this agent exists for lifecycle logging and
//! health broadcast, mirroring the other pool agents in `crate::agents`.

#[derive(Clone, Debug, Default)]
pub struct SessionPoolHealth {
    pub pool_size: usize,
    pub valid_sessions: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SessionRateLimited {
    pub token_suffix: String,
}
