use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{LeadScoutError, Result};

/// Knobs for choosing which posts to scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum posts selected per cycle.
    pub batch_size: usize,
    /// Attempts after which a post is never selected again.
    pub max_attempts: i32,
    /// Minimum time between attempts on the same post.
    pub cooldown: chrono::Duration,
    /// Attempts after which a post with zero reactions is dropped for good.
    pub diminishing_returns_threshold: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 5,
            cooldown: chrono::Duration::days(2),
            diminishing_returns_threshold: 2,
        }
    }
}

/// Knobs for executing scrapes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfig {
    /// Scrapes in flight at once across the whole cycle.
    pub concurrency: usize,
    /// Bound on a single scrape call, pagination included.
    pub call_timeout: Duration,
    /// Reaction pages fetched per post at most.
    pub max_reaction_pages: u32,
    /// Spend cap per cycle in cents. 0 = unlimited.
    pub cycle_budget_cents: u64,
    /// Cost assumed for a scrape before it runs, in cents.
    pub estimated_scrape_cents: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            call_timeout: Duration::from_secs(600),
            max_reaction_pages: 50,
            cycle_budget_cents: 0,
            estimated_scrape_cents: 5,
        }
    }
}

/// Knobs for profile enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichConfig {
    /// Profiles enriched per cycle at most.
    pub max_per_cycle: usize,
    pub call_timeout: Duration,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_per_cycle: 100,
            call_timeout: Duration::from_secs(180),
        }
    }
}

/// Knobs for post media lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaConfig {
    /// Posts looked up per cycle at most.
    pub max_per_cycle: usize,
    pub call_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_per_cycle: 20,
            call_timeout: Duration::from_secs(180),
        }
    }
}

/// Knobs for forwarding leads to the CRM.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Candidate rows fetched per cycle. Fetched once; no second pass.
    pub max_per_cycle: usize,
    /// Rows per commit batch.
    pub batch_size: usize,
    pub call_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_per_cycle: 500,
            batch_size: 50,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // External capabilities
    pub apify_api_key: Option<String>,
    pub hubspot_api_key: Option<String>,

    // Alerts
    pub slack_webhook_url: Option<String>,

    pub scheduler: SchedulerConfig,
    pub scrape: ScrapeConfig,
    pub enrich: EnrichConfig,
    pub media: MediaConfig,
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `DATABASE_URL` is required. API keys are optional here; commands that
    /// need them ask through [`Config::require_apify_key`].
    pub fn from_env() -> Result<Self> {
        let scheduler_defaults = SchedulerConfig::default();
        let scrape_defaults = ScrapeConfig::default();
        let enrich_defaults = EnrichConfig::default();
        let media_defaults = MediaConfig::default();
        let sync_defaults = SyncConfig::default();

        let scheduler = SchedulerConfig {
            batch_size: parsed_env("LEADSCOUT_BATCH_SIZE", scheduler_defaults.batch_size)?,
            max_attempts: parsed_env("LEADSCOUT_MAX_ATTEMPTS", scheduler_defaults.max_attempts)?,
            cooldown: chrono::Duration::hours(parsed_env(
                "LEADSCOUT_COOLDOWN_HOURS",
                scheduler_defaults.cooldown.num_hours(),
            )?),
            diminishing_returns_threshold: parsed_env(
                "LEADSCOUT_DIMINISHING_RETURNS_THRESHOLD",
                scheduler_defaults.diminishing_returns_threshold,
            )?,
        };

        let scrape = ScrapeConfig {
            concurrency: parsed_env("LEADSCOUT_SCRAPE_CONCURRENCY", scrape_defaults.concurrency)?
                .max(1),
            call_timeout: Duration::from_secs(parsed_env(
                "LEADSCOUT_SCRAPE_TIMEOUT_SECS",
                scrape_defaults.call_timeout.as_secs(),
            )?),
            max_reaction_pages: parsed_env(
                "LEADSCOUT_MAX_REACTION_PAGES",
                scrape_defaults.max_reaction_pages,
            )?,
            cycle_budget_cents: parsed_env(
                "LEADSCOUT_CYCLE_BUDGET_CENTS",
                scrape_defaults.cycle_budget_cents,
            )?,
            estimated_scrape_cents: parsed_env(
                "LEADSCOUT_ESTIMATED_SCRAPE_CENTS",
                scrape_defaults.estimated_scrape_cents,
            )?,
        };

        let enrich = EnrichConfig {
            max_per_cycle: parsed_env("LEADSCOUT_ENRICH_MAX_PER_CYCLE", enrich_defaults.max_per_cycle)?,
            call_timeout: Duration::from_secs(parsed_env(
                "LEADSCOUT_ENRICH_TIMEOUT_SECS",
                enrich_defaults.call_timeout.as_secs(),
            )?),
        };

        let media = MediaConfig {
            max_per_cycle: parsed_env("LEADSCOUT_MEDIA_MAX_PER_CYCLE", media_defaults.max_per_cycle)?,
            call_timeout: Duration::from_secs(parsed_env(
                "LEADSCOUT_MEDIA_TIMEOUT_SECS",
                media_defaults.call_timeout.as_secs(),
            )?),
        };

        let sync = SyncConfig {
            max_per_cycle: parsed_env("LEADSCOUT_SYNC_MAX_PER_CYCLE", sync_defaults.max_per_cycle)?,
            batch_size: parsed_env("LEADSCOUT_SYNC_BATCH_SIZE", sync_defaults.batch_size)?.max(1),
            call_timeout: Duration::from_secs(parsed_env(
                "LEADSCOUT_SYNC_TIMEOUT_SECS",
                sync_defaults.call_timeout.as_secs(),
            )?),
        };

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            apify_api_key: optional_env("APIFY_API_KEY"),
            hubspot_api_key: optional_env("HUBSPOT_API_KEY"),
            slack_webhook_url: optional_env("SLACK_WEBHOOK_URL"),
            scheduler,
            scrape,
            enrich,
            media,
            sync,
        })
    }

    pub fn require_apify_key(&self) -> Result<&str> {
        self.apify_api_key
            .as_deref()
            .ok_or_else(|| LeadScoutError::Config("APIFY_API_KEY environment variable is required".into()))
    }

    pub fn require_hubspot_key(&self) -> Result<&str> {
        self.hubspot_api_key
            .as_deref()
            .ok_or_else(|| LeadScoutError::Config("HUBSPOT_API_KEY environment variable is required".into()))
    }

    /// Log the effective configuration with secrets reduced to set/unset.
    pub fn log_redacted(&self) {
        info!(
            database_url = %redact_url(&self.database_url),
            apify = self.apify_api_key.is_some(),
            hubspot = self.hubspot_api_key.is_some(),
            slack = self.slack_webhook_url.is_some(),
            batch_size = self.scheduler.batch_size,
            max_attempts = self.scheduler.max_attempts,
            cooldown_hours = self.scheduler.cooldown.num_hours(),
            diminishing_returns_threshold = self.scheduler.diminishing_returns_threshold,
            concurrency = self.scrape.concurrency,
            scrape_timeout_secs = self.scrape.call_timeout.as_secs(),
            cycle_budget_cents = self.scrape.cycle_budget_cents,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| LeadScoutError::Config(format!("{key} environment variable is required")))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LeadScoutError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}

/// Hide the password in a connection string.
fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let s = SchedulerConfig::default();
        assert_eq!(s.batch_size, 5);
        assert_eq!(s.max_attempts, 5);
        assert_eq!(s.cooldown, chrono::Duration::days(2));
        assert_eq!(s.diminishing_returns_threshold, 2);
        assert_eq!(ScrapeConfig::default().concurrency, 3);
    }

    #[test]
    fn redact_hides_password() {
        let out = redact_url("postgres://app:hunter2@db:5432/leads");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("***"));
    }
}
