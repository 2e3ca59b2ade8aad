use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::time::Duration;

use crate::bot::filters::DEFAULT_SKIP_KEYWORDS;
use crate::retry::RetryConfig;

const MAX_STALE_WAIT_MINUTES: i64 = 7 * 24 * 60;

/// Live football halftime-draw bet tracker
#[derive(Parser, Debug, Clone)]
#[command(name = "halftime-tracker", version, about)]
pub struct Config {
    /// Seconds to sleep between poll cycles
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "60")]
    pub poll_interval_secs: u64,

    /// Minutes an open bet may wait for its halftime before reconciliation picks it up
    #[arg(long, env = "STALE_WAIT_MINUTES", default_value = "120")]
    pub stale_wait_minutes: i64,

    /// Minimum seconds between two reconciliation batches
    #[arg(long, env = "RECONCILE_CALL_INTERVAL_SECS", default_value = "300")]
    pub reconcile_call_interval_secs: i64,

    /// Attempts per fixture when fetching a final result
    #[arg(long, env = "MAX_FETCH_RETRIES", default_value = "3")]
    pub max_fetch_retries: u32,

    /// Backoff base delay in milliseconds, doubled after each failed attempt
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value = "2000")]
    pub retry_base_delay_ms: u64,

    /// Combined season goal average (scored + conceded, both teams) required to place; 0 disables
    #[arg(long, env = "MIN_TOTAL_AVERAGE_GOALS", default_value = "3.0")]
    pub min_total_average_goals: f64,

    /// Comma-separated name fragments that exclude a fixture (defaults to a built-in list)
    #[arg(long, env = "SKIP_KEYWORDS")]
    pub skip_keywords: Option<String>,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "tracker.db")]
    pub database_path: String,

    /// SofaScore API base URL
    #[arg(
        long,
        env = "SOFASCORE_API_URL",
        default_value = "https://api.sofascore.com/api/v1"
    )]
    pub sofascore_api_url: String,

    /// Sport slug used for the live events feed
    #[arg(long, env = "SPORT", default_value = "football")]
    pub sport: String,

    /// Telegram bot token; without it (and a chat id) messages are only logged
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: Option<String>,

    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    /// Read-only dashboard listen address (disabled when unset)
    #[arg(long, env = "DASHBOARD_ADDR")]
    pub dashboard_addr: Option<String>,

    /// Run a one-shot job instead of the tracker loop
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Send the day's fixtures that involve a tournament's top or bottom teams, then exit
    DailyFixtures {
        /// SofaScore category whose tournaments are scanned
        #[arg(long, env = "FIXTURES_CATEGORY_ID", default_value = "1")]
        category_id: i64,

        /// Fixture date (YYYY-MM-DD); today in UTC when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Teams taken from each end of a standings table
        #[arg(long, default_value = "3")]
        edge_size: usize,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }
        if self.stale_wait_minutes < 15 {
            anyhow::bail!("stale_wait_minutes must be at least 15 (a first half plus stoppage)");
        }
        if self.stale_wait_minutes > MAX_STALE_WAIT_MINUTES {
            anyhow::bail!(
                "stale_wait_minutes must be at most {} (one week)",
                MAX_STALE_WAIT_MINUTES
            );
        }
        if self.reconcile_call_interval_secs < 0 {
            anyhow::bail!("reconcile_call_interval_secs must not be negative");
        }
        if self.max_fetch_retries == 0 {
            anyhow::bail!("max_fetch_retries must be at least 1");
        }
        if self.min_total_average_goals < 0.0 {
            anyhow::bail!("min_total_average_goals must not be negative");
        }
        if self.telegram_bot_token.is_some() != self.telegram_chat_id.is_some() {
            anyhow::bail!("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together");
        }
        if let Some(Command::DailyFixtures { edge_size: 0, .. }) = &self.command {
            anyhow::bail!("edge_size must be at least 1");
        }
        if let Some(addr) = &self.dashboard_addr {
            addr.parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow::anyhow!("invalid dashboard_addr '{}': {}", addr, e))?;
        }
        Ok(())
    }

    /// Lower-cased skip keywords, falling back to the built-in list.
    pub fn keyword_list(&self) -> Vec<String> {
        match &self.skip_keywords {
            Some(raw) => raw
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            None => DEFAULT_SKIP_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn fetch_retry(&self) -> RetryConfig {
        RetryConfig {
            attempts: self.max_fetch_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["halftime-tracker"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.stale_wait_minutes, 120);
        assert_eq!(config.fetch_retry().base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_short_stale_wait_rejected() {
        let config = parse(&["--stale-wait-minutes", "10"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_stale_wait_rejected() {
        assert!(parse(&["--stale-wait-minutes", "10080"]).validate().is_ok());
        assert!(parse(&["--stale-wait-minutes", "10081"]).validate().is_err());
        assert!(parse(&["--stale-wait-minutes", "9223372036854775807"]).validate().is_err());
    }

    #[test]
    fn test_keyword_list_override() {
        let config = parse(&["--skip-keywords", " Reserve, ,U21 "]);
        assert_eq!(config.keyword_list(), vec!["reserve", "u21"]);
        assert!(parse(&[]).keyword_list().contains(&"youth".to_string()));
    }

    #[test]
    fn test_daily_fixtures_subcommand() {
        assert_eq!(parse(&[]).command, None);
        let config = parse(&["daily-fixtures", "--date", "2026-10-17"]);
        assert_eq!(
            config.command,
            Some(Command::DailyFixtures {
                category_id: 1,
                date: NaiveDate::from_ymd_opt(2026, 10, 17),
                edge_size: 3,
            })
        );
        assert!(config.validate().is_ok());
        assert!(parse(&["daily-fixtures", "--edge-size", "0"]).validate().is_err());
    }

    #[test]
    fn test_half_configured_telegram_rejected() {
        let config = parse(&["--telegram-bot-token", "abc"]);
        assert!(config.validate().is_err());
    }
}
