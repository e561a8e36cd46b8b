//! Dispatch configuration and account loading.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use prodshot_core::types::JobType;
use prodshot_core::{Account, ApiKey};

/// Tunables for the dispatcher loop and per-job execution.
///
/// All fields have defaults suitable for production against the real
/// service; tests swap in millisecond-scale values.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often the loop re-checks the queue (also the back-pressure
    /// wait when every account is at capacity).
    pub queue_poll_interval: Duration,
    /// Maximum retryable failures per job before it fails terminally.
    pub max_retries: u32,
    /// Ceiling on consecutive queue-full responses during task
    /// creation. Separate from `max_retries`.
    pub queue_full_retries: u32,
    /// Delay between queue-full creation attempts (longer than network
    /// backoff on purpose: remote capacity recovers slowly).
    pub queue_full_delay: Duration,
    /// Delay between status polls for an in-flight task.
    pub poll_interval: Duration,
    /// Overall per-job deadline, measured from submission.
    pub job_deadline: Duration,
    /// How long shutdown waits for in-flight cleanups.
    pub shutdown_grace: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_poll_interval: Duration::from_secs(1),
            max_retries: 3,
            queue_full_retries: 5,
            queue_full_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            job_deadline: Duration::from_secs(600),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `DISPATCH_QUEUE_POLL_MS`        | `1000`  |
    /// | `DISPATCH_MAX_RETRIES`          | `3`     |
    /// | `DISPATCH_QUEUE_FULL_RETRIES`   | `5`     |
    /// | `DISPATCH_QUEUE_FULL_DELAY_SECS`| `10`    |
    /// | `DISPATCH_POLL_INTERVAL_SECS`   | `5`     |
    /// | `DISPATCH_JOB_DEADLINE_SECS`    | `600`   |
    /// | `DISPATCH_SHUTDOWN_GRACE_SECS`  | `5`     |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_poll_interval: env_duration_ms("DISPATCH_QUEUE_POLL_MS", defaults.queue_poll_interval),
            max_retries: env_u32("DISPATCH_MAX_RETRIES", defaults.max_retries),
            queue_full_retries: env_u32("DISPATCH_QUEUE_FULL_RETRIES", defaults.queue_full_retries),
            queue_full_delay: env_duration_secs("DISPATCH_QUEUE_FULL_DELAY_SECS", defaults.queue_full_delay),
            poll_interval: env_duration_secs("DISPATCH_POLL_INTERVAL_SECS", defaults.poll_interval),
            job_deadline: env_duration_secs("DISPATCH_JOB_DEADLINE_SECS", defaults.job_deadline),
            shutdown_grace: env_duration_secs("DISPATCH_SHUTDOWN_GRACE_SECS", defaults.shutdown_grace),
        }
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| panic!("{name} must be a valid u32")),
        Err(_) => default,
    }
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(v) => Duration::from_secs(
            v.parse().unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        ),
        Err(_) => default,
    }
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(v) => Duration::from_millis(
            v.parse().unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        ),
        Err(_) => default,
    }
}

/// One account entry as configured (e.g. in `RUNNINGHUB_ACCOUNTS`).
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub api_key: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    /// Job type -> remote workflow id.
    pub workflows: HashMap<String, String>,
}

fn default_max_concurrency() -> u32 {
    5
}

/// Parse the JSON account list used by the worker binary.
pub fn parse_accounts(json: &str) -> Result<Vec<Account>, serde_json::Error> {
    let configs: Vec<AccountConfig> = serde_json::from_str(json)?;
    Ok(configs
        .into_iter()
        .map(|c| {
            let workflows = c
                .workflows
                .into_iter()
                .map(|(t, wf)| (JobType::new(t), wf))
                .collect();
            Account::new(ApiKey::new(c.api_key), workflows, c.max_concurrency)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.queue_full_delay > config.queue_poll_interval);
    }

    #[test]
    fn parse_accounts_maps_workflows() {
        let json = r#"[
            {
                "api_key": "key-1",
                "max_concurrency": 2,
                "workflows": {"product": "wf-100"}
            },
            {
                "api_key": "key-2",
                "workflows": {"product": "wf-200", "background": "wf-201"}
            }
        ]"#;

        let accounts = parse_accounts(json).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].max_concurrency, 2);
        // Default applies when max_concurrency is omitted.
        assert_eq!(accounts[1].max_concurrency, 5);
        assert_eq!(
            accounts[1].workflow_for(&JobType::from("background")).unwrap(),
            "wf-201"
        );
    }

    #[test]
    fn parse_accounts_rejects_bad_json() {
        assert!(parse_accounts("not json").is_err());
    }
}
