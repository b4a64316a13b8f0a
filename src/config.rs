// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{backoff, defaults};
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Retry behaviour of a watch session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Delay before the first retry after a transient failure
    pub backoff_initial: Duration,
    /// Upper bound for the doubling retry delay
    pub backoff_max: Duration,
    /// Consecutive transient failures tolerated before the session gives up.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backoff_initial: Duration::from_millis(backoff::INITIAL_MS),
            backoff_max: Duration::from_secs(backoff::MAX_SECS),
            max_retries: None,
        }
    }
}

/// Binary configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace whose jobs are watched
    pub namespace: String,
    pub label_selector: Option<String>,
    /// When set, wait for this job to succeed and exit
    pub wait_job_name: Option<String>,
    pub wait_timeout: Duration,
    pub watch: WatchConfig,
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let namespace =
            env::var("WATCH_NAMESPACE").unwrap_or_else(|_| defaults::NAMESPACE.to_string());
        let label_selector = env::var("WATCH_LABEL_SELECTOR").ok();
        let wait_job_name = env::var("WAIT_JOB_NAME").ok();
        let wait_timeout = Duration::from_secs(
            parse_var("WAIT_TIMEOUT_SECS")?.unwrap_or(defaults::WAIT_TIMEOUT_SECS),
        );

        let mut watch = WatchConfig::default();
        if let Some(ms) = parse_var::<u64>("WATCH_BACKOFF_INITIAL_MS")? {
            watch.backoff_initial = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("WATCH_BACKOFF_MAX_SECS")? {
            watch.backoff_max = Duration::from_secs(secs);
        }
        watch.max_retries = parse_var("WATCH_MAX_RETRIES")?;

        Ok(Config {
            namespace,
            label_selector,
            wait_job_name,
            wait_timeout,
            watch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();

        assert_eq!(config.backoff_initial, Duration::from_millis(500));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
        assert_eq!(config.max_retries, None);
    }

    #[test]
    fn test_parse_var_missing_is_none() {
        let value: Option<u64> = parse_var("INFORMANT_TEST_SURELY_UNSET_VARIABLE").unwrap();
        assert_eq!(value, None);
    }
}
