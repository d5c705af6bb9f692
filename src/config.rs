//! Cascade configuration with environment overrides.
//!
//! Defaults are compiled in; every knob can be overridden via a
//! `STORYLOOM_*` variable at startup. The config is built once at the
//! composition root and passed into the cascades by value.

use std::time::Duration;

use crate::retry::BackoffPolicy;

/// Bounds for the per-chapter illustration worker pool.
const POOL_SIZE_MIN: usize = 1;
const POOL_SIZE_MAX: usize = 8;

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    /// Total-request timeout for cloud provider calls.
    pub request_timeout: Duration,
    /// Timeout for local-runtime calls; short, so an unresponsive local
    /// process fails fast instead of consuming the retry budget.
    pub local_timeout: Duration,
    /// Backoff policy for the rotating secondary tier.
    pub backoff: BackoffPolicy,
    /// Polls against the community-compute queue before giving up.
    pub queue_poll_budget: u32,
    pub queue_poll_interval: Duration,
    /// Download attempts before substituting the placeholder image.
    pub download_attempts: u32,
    /// Worker threads for batch chapter illustration.
    pub pool_size: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            local_timeout: Duration::from_secs(20),
            backoff: BackoffPolicy::default(),
            queue_poll_budget: 10,
            queue_poll_interval: Duration::from_secs(5),
            download_attempts: 5,
            pool_size: 4,
        }
    }
}

impl CascadeConfig {
    /// Defaults with `STORYLOOM_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("STORYLOOM_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("STORYLOOM_LOCAL_TIMEOUT_SECS") {
            config.local_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_u64("STORYLOOM_RETRY_ATTEMPTS") {
            config.backoff.max_attempts = attempts.clamp(1, 8) as u32;
        }
        if let Some(polls) = env_u64("STORYLOOM_QUEUE_POLL_BUDGET") {
            config.queue_poll_budget = polls as u32;
        }
        if let Some(attempts) = env_u64("STORYLOOM_DOWNLOAD_ATTEMPTS") {
            config.download_attempts = attempts.clamp(1, 10) as u32;
        }
        if let Some(size) = env_u64("STORYLOOM_POOL_SIZE") {
            config.pool_size = (size as usize).clamp(POOL_SIZE_MIN, POOL_SIZE_MAX);
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}
