use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RunnerError;
use crate::harness::ReturnPolicy;

/// Limits applied to every sandbox realm.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
    pub stack_size_limit: usize,
    pub thread_stack_size: usize, // in bytes
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 10_000_000,
            recursion_limit: 2_048,
            stack_size_limit: 1024 * 1024,
            thread_stack_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub implicit_return: ReturnPolicy,
    pub sandbox: SandboxConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_retries: 500, // ~25s
            implicit_return: ReturnPolicy::Honor,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Defaults overridden by `CHALLENGE_*` environment variables.
    pub fn from_env() -> Result<Self, RunnerError> {
        let mut config = Self::default();

        if let Some(ms) = read_env::<u64>("CHALLENGE_POLL_INTERVAL_MS")? {
            if ms == 0 {
                return Err(RunnerError::Config {
                    key: "CHALLENGE_POLL_INTERVAL_MS",
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(retries) = read_env("CHALLENGE_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(limit) = read_env("CHALLENGE_LOOP_LIMIT")? {
            config.sandbox.loop_iteration_limit = limit;
        }
        if let Some(limit) = read_env("CHALLENGE_RECURSION_LIMIT")? {
            config.sandbox.recursion_limit = limit;
        }
        if let Some(policy) = read_env("CHALLENGE_IMPLICIT_RETURN")? {
            config.implicit_return = policy;
        }
        if config.poll_interval.checked_mul(config.max_retries).is_none() {
            return Err(RunnerError::Config {
                key: "CHALLENGE_MAX_RETRIES",
                reason: "poll interval times retries overflows the timeout".to_string(),
            });
        }

        Ok(config)
    }

    /// Wall-clock ceiling for one evaluation.
    pub fn timeout(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_retries)
    }
}

fn read_env<T>(key: &'static str) -> Result<Option<T>, RunnerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| RunnerError::Config { key, reason: e.to_string() }),
        Err(_) => Ok(None),
    }
}
