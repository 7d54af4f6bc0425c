use std::time::Duration;

use anyhow::{Context, Result};

use crate::trial::TrialConfig;
use crate::watch::WatchConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:database/coupon_scout.db";

/// Runtime settings, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub database_url: String,
    pub discord_webhook_url: Option<String>,
    pub trial: TrialConfig,
    pub watch: WatchConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match var(key) {
                Some(raw) => {
                    let ms: u64 = raw
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a number of milliseconds"))?;
                    Ok(Duration::from_millis(ms))
                }
                None => Ok(default),
            }
        };

        let defaults = TrialConfig::default();
        let trial = TrialConfig {
            reset_settle: millis("RESET_SETTLE_MS", defaults.reset_settle)?,
            apply_settle: millis("APPLY_SETTLE_MS", defaults.apply_settle)?,
        };

        let mut watch = WatchConfig::default();
        if let Some(raw) = var("WATCH_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .context("WATCH_TIMEOUT_SECS must be a number of seconds")?;
            watch.timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            api_url: var("COUPON_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            discord_webhook_url: var("DISCORD_WEBHOOK_URL"),
            trial,
            watch,
        })
    }
}
