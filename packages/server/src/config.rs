use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::kernel::dispatch::EmailMode;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Worker sleep between empty polls.
    pub poll_interval: Duration,
    /// Per-event wall-clock budget for one pass of the rule engine.
    pub processing_timeout: Duration,
    /// Per-webhook-call wall-clock budget.
    pub webhook_timeout: Duration,
    /// Default lease age before requeue-stuck reclaims a processing event.
    pub requeue_stuck_after: Duration,
    pub email_mode: EmailMode,
    pub cors_origins: Vec<String>,
    pub max_connections: u32,
    pub worker_count: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            poll_interval: Duration::from_secs(parse_secs("POLL_INTERVAL_SECS", 1)?),
            processing_timeout: Duration::from_secs(parse_secs("PROCESSING_TIMEOUT_SECS", 60)?),
            webhook_timeout: Duration::from_secs(parse_secs("WEBHOOK_TIMEOUT_SECS", 5)?),
            requeue_stuck_after: Duration::from_secs(parse_secs("REQUEUE_STUCK_AFTER_SECS", 300)?),
            email_mode: env::var("EMAIL_MODE")
                .unwrap_or_else(|_| "log".to_string())
                .parse()
                .context("EMAIL_MODE must be 'disabled' or 'log'")?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_connections: env::var("MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("MAX_CONNECTIONS must be a valid number")?,
            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("WORKER_COUNT must be a valid number")?,
        })
    }
}

fn parse_secs(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{var} must be a number of seconds")),
        Err(_) => Ok(default),
    }
}
