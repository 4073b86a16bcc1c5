//! Scheduler configuration, with environment-driven overrides per spec §6.4.

use crate::retry::RetryPolicy;
use chrono::Duration;
use std::time::Duration as StdDuration;

/// Construction-time configuration for the scheduler core.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick interval for the scheduler loop.
    pub check_interval: StdDuration,
    /// Worker-pool cap.
    pub max_concurrent_agents: usize,
    /// Retry/backoff policy.
    pub retry: RetryPolicy,
    /// Dispatch overdue tasks immediately on `load_from_store`.
    pub run_missed_on_startup: bool,
    /// Start the loop at construction rather than requiring an explicit
    /// `start()` call.
    pub auto_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: StdDuration::from_millis(60_000),
            max_concurrent_agents: 5,
            retry: RetryPolicy::default(),
            run_missed_on_startup: false,
            auto_start: false,
        }
    }
}

impl SchedulerConfig {
    /// Load overrides from the recognized environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u64("CHECK_INTERVAL") {
            cfg.check_interval = StdDuration::from_millis(v);
        }
        if let Some(v) = env_usize("MAX_CONCURRENT_AGENTS") {
            cfg.max_concurrent_agents = v;
        }
        if let Some(v) = env_u32("MAX_RETRIES") {
            cfg.retry.max_retries = v;
        }
        if let Some(v) = env_u64("BASE_BACKOFF_DELAY") {
            cfg.retry.base_backoff = Duration::milliseconds(v as i64);
        }
        if let Some(v) = env_u64("MAX_BACKOFF_DELAY") {
            cfg.retry.max_backoff = Duration::milliseconds(v as i64);
        }
        if let Some(v) = env_bool("RUN_MISSED_ON_STARTUP") {
            cfg.run_missed_on_startup = v;
        }
        if let Some(v) = env_bool("AUTO_START") {
            cfg.auto_start = v;
        }

        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_bool(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
