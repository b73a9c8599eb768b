use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use leadscout_common::{
    Engager, LeadCandidate, NewEngager, Post, PostMedia, PostSeed, ProfileEnrichment, Result,
    ScrapeEvent, ScrapeStatus,
};

/// Everything one scrape attempt writes, applied as a single unit.
#[derive(Debug, Clone)]
pub struct ScrapeCommit {
    pub post_url: String,
    pub ran_at: DateTime<Utc>,
    pub status: ScrapeStatus,
    /// Replaces the post's `total_reactions` when set. Only successes carry it.
    pub reactions: Option<i32>,
    pub cost_usd: f64,
    pub error: Option<String>,
    /// Already normalized and collapsed. Inserted if absent per (profile, post).
    pub engagers: Vec<NewEngager>,
}

impl ScrapeCommit {
    pub fn success(
        post_url: impl Into<String>,
        ran_at: DateTime<Utc>,
        reactions: i32,
        cost_usd: f64,
        engagers: Vec<NewEngager>,
    ) -> Self {
        Self {
            post_url: post_url.into(),
            ran_at,
            status: ScrapeStatus::Success,
            reactions: Some(reactions),
            cost_usd,
            error: None,
            engagers,
        }
    }

    /// A failed or skipped attempt: no reactions, no engagers.
    pub fn failure(
        post_url: impl Into<String>,
        ran_at: DateTime<Utc>,
        status: ScrapeStatus,
        cost_usd: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            post_url: post_url.into(),
            ran_at,
            status,
            reactions: None,
            cost_usd,
            error: Some(error.into()),
            engagers: Vec::new(),
        }
    }
}

/// What a committed scrape did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub scrape_id: i64,
    /// The post's attempt count after this commit.
    pub scrape_count: i32,
    pub engagers_inserted: usize,
    /// Engagers that already had a row for this post and were left alone.
    pub engagers_existing: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub renamed: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

/// A post whose `scrape_count` disagrees with its scrape history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub post_url: String,
    pub scrape_count: i64,
    pub event_count: i64,
}

/// One executed cycle, for the run log.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: serde_json::Value,
}

/// Durable state for posts, scrape events and engagers.
///
/// Implementations must apply [`Ledger::commit_scrape`] atomically under a
/// lock on the post, and [`Ledger::mark_forwarded`] as a compare-and-set.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Insert new posts and rename existing ones. Counters are never touched.
    async fn upsert_posts(&self, seeds: &[PostSeed]) -> Result<UpsertStats>;

    /// Snapshot of every tracked post.
    async fn posts(&self) -> Result<Vec<Post>>;

    async fn post(&self, post_url: &str) -> Result<Option<Post>>;

    /// Record one scrape attempt: event, post counters and engagers together.
    ///
    /// Fails with `StateInconsistency` (and writes nothing) when the post's
    /// `scrape_count` no longer matches its event count.
    async fn commit_scrape(&self, commit: ScrapeCommit) -> Result<CommitReceipt>;

    /// Scrape history for a post, oldest first.
    async fn scrape_events(&self, post_url: &str) -> Result<Vec<ScrapeEvent>>;

    async fn engagers_for_post(&self, post_url: &str) -> Result<Vec<Engager>>;

    /// Distinct person-profile URLs that have never been enriched, oldest sighting first.
    async fn profiles_needing_enrichment(&self, limit: usize) -> Result<Vec<String>>;

    /// Apply an enrichment to every row for this profile. Returns rows touched.
    ///
    /// Fields with text replace stored values; absent fields keep them. An
    /// empty enrichment only stamps rows that were never enriched, so rows
    /// enriched earlier (on other posts) keep their company and title.
    async fn record_enrichment(
        &self,
        profile_url: &str,
        enrichment: &ProfileEnrichment,
        enriched_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Posts whose media was never looked up, oldest first.
    async fn posts_needing_media(&self, limit: usize) -> Result<Vec<String>>;

    /// Store a post's media and mark it enriched. Empty media still marks it.
    ///
    /// Returns false if the post was already enriched (or is unknown), in
    /// which case nothing is written.
    async fn record_post_media(
        &self,
        post_url: &str,
        media: &PostMedia,
        enriched_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn post_media(&self, post_url: &str) -> Result<Option<PostMedia>>;

    /// Unforwarded, fully enriched person engagers, in insertion order.
    async fn lead_candidates(&self, limit: usize) -> Result<Vec<LeadCandidate>>;

    /// Flip `pushed_to_crm` for rows that are still unforwarded. Returns the
    /// ids this call actually flipped; the rest were already forwarded.
    async fn mark_forwarded(&self, engager_ids: &[i64], pushed_at: DateTime<Utc>) -> Result<Vec<i64>>;

    /// Posts whose attempt count disagrees with their event count.
    async fn audit(&self) -> Result<Vec<CountMismatch>>;

    async fn record_cycle(&self, record: &CycleRecord) -> Result<()>;
}
