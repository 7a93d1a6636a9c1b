use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub auth_token: String,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub retry_schedule_path: String,
    pub max_concurrent_calls: u32,
    pub max_retry_attempts: u32,
    pub duplicate_call_window_minutes: i64,
    pub scheduler_interval_minutes: i64,
    pub dlq_retention_days: i64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must be a valid value: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults named in the environment-knob table.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            port: parse_env("PORT", 8080u16)?,
            auth_token: env::var("AUTH_TOKEN").context("AUTH_TOKEN must be set")?,
            provider_base_url: env::var("PROVIDER_BASE_URL")
                .context("PROVIDER_BASE_URL must be set")?,
            provider_api_key: env::var("PROVIDER_API_KEY")
                .context("PROVIDER_API_KEY must be set")?,
            retry_schedule_path: env_or("RETRY_SCHEDULE_PATH", "retry_schedule.yaml"),
            max_concurrent_calls: parse_env("MAX_CONCURRENT_CALLS", 100u32)?,
            max_retry_attempts: parse_env("MAX_RETRY_ATTEMPTS", 3u32)?,
            duplicate_call_window_minutes: parse_env("DUPLICATE_CALL_WINDOW_MINUTES", 30i64)?,
            scheduler_interval_minutes: parse_env("SCHEDULER_INTERVAL_MINUTES", 1i64)?,
            dlq_retention_days: parse_env("DLQ_RETENTION_DAYS", 30i64)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(env_or("ORCHESTRATOR_TEST_UNSET_KEY", "fallback"), "fallback");
    }
}
