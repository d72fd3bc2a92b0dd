// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Tunables for the background task manager core, layered as CLI flags with
/// `BGTASK_*` environment fallbacks, mirroring the defaults described in the
/// external interface contract.
#[derive(Debug, Clone, Parser)]
#[command(name = "bgtask-core", version, about)]
pub struct ManagerConfig {
    /// Maximum number of tasks the admission queue will start concurrently.
    #[arg(long, env = "BGTASK_MAX_CONCURRENT_STARTS", default_value_t = 10)]
    pub max_concurrent_starts: u32,

    /// Maximum number of terminal tasks retained before the oldest is evicted.
    #[arg(long, env = "BGTASK_MAX_COMPLETED_TASKS", default_value_t = 100)]
    pub max_completed_tasks: usize,

    /// Idle debounce window in milliseconds before a task is considered for
    /// completion resolution.
    #[arg(long, env = "BGTASK_IDLE_DEBOUNCE_MS", default_value_t = 500)]
    pub idle_debounce_ms: u64,

    /// Result size cap in bytes before truncation is applied.
    #[arg(long, env = "BGTASK_RESULT_CAP_BYTES", default_value_t = 102_400)]
    pub result_cap_bytes: usize,

    /// Maximum notification delivery attempts.
    #[arg(long, env = "BGTASK_NOTIFICATION_RETRIES", default_value_t = 3)]
    pub notification_retries: u32,

    /// Base delay for notification retry backoff in milliseconds; doubled
    /// per attempt.
    #[arg(long, env = "BGTASK_NOTIFICATION_RETRY_BASE_MS", default_value_t = 1000)]
    pub notification_retry_base_ms: u64,

    /// Orphan sweep interval in seconds.
    #[arg(long, env = "BGTASK_ORPHAN_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub orphan_sweep_interval_secs: u64,

    /// Maximum time a task may remain running before the orphan sweep fails
    /// it for a timeout.
    #[arg(long, env = "BGTASK_RUNNING_TIMEOUT_SECS", default_value_t = 30 * 60)]
    pub running_timeout_secs: u64,

    /// Concurrency-limiter acquire timeout in seconds.
    #[arg(long, env = "BGTASK_PERMIT_ACQUIRE_TIMEOUT_SECS", default_value_t = 5 * 60)]
    pub permit_acquire_timeout_secs: u64,

    /// Default per-model concurrency cap for models matching no configured
    /// pattern.
    #[arg(long, env = "BGTASK_DEFAULT_MODEL_CAP", default_value_t = 3)]
    pub default_model_cap: u32,

    /// Circuit breaker consecutive-failure threshold before opening.
    #[arg(long, env = "BGTASK_BREAKER_FAILURE_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,

    /// Circuit breaker recovery timeout in seconds.
    #[arg(long, env = "BGTASK_BREAKER_RECOVERY_SECS", default_value_t = 30)]
    pub breaker_recovery_secs: u64,

    /// Circuit breaker maximum concurrent half-open probes.
    #[arg(long, env = "BGTASK_BREAKER_HALF_OPEN_MAX_CALLS", default_value_t = 3)]
    pub breaker_half_open_max_calls: u32,

    /// Working directory under which `.opencode/background-tasks.json` is
    /// read and written.
    #[arg(long, env = "BGTASK_STATE_DIR", default_value = ".")]
    pub state_dir: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "BGTASK_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "BGTASK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_starts: 10,
            max_completed_tasks: 100,
            idle_debounce_ms: 500,
            result_cap_bytes: 102_400,
            notification_retries: 3,
            notification_retry_base_ms: 1000,
            orphan_sweep_interval_secs: 60,
            running_timeout_secs: 30 * 60,
            permit_acquire_timeout_secs: 5 * 60,
            default_model_cap: 3,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 30,
            breaker_half_open_max_calls: 3,
            state_dir: PathBuf::from("."),
            log_format: "json".to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

impl ManagerConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_starts == 0 {
            anyhow::bail!("--max-concurrent-starts must be greater than zero");
        }
        if self.state_dir.as_os_str().is_empty() {
            anyhow::bail!("--state-dir must not be empty");
        }
        Ok(())
    }

    pub fn persistence_path(&self) -> PathBuf {
        self.state_dir.join(".opencode").join("background-tasks.json")
    }

    /// Known provider-prefix concurrency caps, matched as glob patterns
    /// before falling back to `default_model_cap`.
    pub fn model_pattern_caps(&self) -> Vec<(String, u32)> {
        vec![("anthropic/*".to_owned(), 3), ("openai/*".to_owned(), 5), ("google/*".to_owned(), 10)]
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
