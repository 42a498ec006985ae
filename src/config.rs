use std::env;
use std::time::Duration;

use anyhow::Context as _;

use crate::utils::RetryConfig;

// ============================================================================
// Engine Configuration
// ============================================================================
//
// Read from the environment by the binary:
//
//   DATABASE_URL        Postgres event store; in-memory store when unset
//   DATABASE_MAX_CONNECTIONS
//   IAM_DOMAIN          parent domain of generated org domains
//   INSTANCE_ID         tenant the demo runs against
//   PUSH_TIMEOUT_MS     request deadline applied to each command
//   RETRY_MAX_ATTEMPTS  attempts of retry_on_conflict
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub iam_domain: String,
    pub instance_id: String,
    pub push_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            iam_domain: "localhost".to_string(),
            instance_id: "default".to_string(),
            push_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, falling back to defaults for missing keys
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_connections = match value("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            None => defaults.max_connections,
        };
        let push_timeout = match value("PUSH_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(raw.parse().context("PUSH_TIMEOUT_MS must be milliseconds")?),
            None => defaults.push_timeout,
        };
        let mut retry = defaults.retry;
        if let Some(raw) = value("RETRY_MAX_ATTEMPTS") {
            retry.max_attempts = raw.parse().context("RETRY_MAX_ATTEMPTS must be a positive integer")?;
            anyhow::ensure!(retry.max_attempts > 0, "RETRY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            database_url: value("DATABASE_URL"),
            max_connections,
            iam_domain: value("IAM_DOMAIN").unwrap_or(defaults.iam_domain),
            instance_id: value("INSTANCE_ID").unwrap_or(defaults.instance_id),
            push_timeout,
            retry,
        })
    }
}
