use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, info, warn};

use leadscout_common::{
    is_linkedin_post_url, LeadScoutError, Result, ScrapeConfig, ScrapeFailure, ScrapeResult,
    ScrapeStatus,
};
use leadscout_ledger::{CommitReceipt, Ledger, ScrapeCommit};

use super::dedup::{self, DedupStats};
use super::stats::ScrapeStats;
use crate::notify::{Alert, NotifyBackend};
use crate::scheduling::{BudgetTracker, ScheduledPost};
use crate::traits::EngagementScraper;

/// Runs the scrapes for one cycle and commits each post's outcome.
///
/// One post failing never stops the others. A ledger failure stops new
/// launches and is returned once everything in flight has settled.
pub struct ScrapeCoordinator {
    ledger: Arc<dyn Ledger>,
    scraper: Arc<dyn EngagementScraper>,
    notifier: Arc<dyn NotifyBackend>,
    config: ScrapeConfig,
    budget: BudgetTracker,
    /// Bounds provider calls in flight. Commits happen outside it.
    slots: Semaphore,
}

enum PostOutcome {
    Committed {
        status: ScrapeStatus,
        receipt: CommitReceipt,
        dedup: DedupStats,
        cost_usd: f64,
    },
    OverBudget,
    /// The cycle halted before this post started.
    NotLaunched,
    Inconsistent,
    /// Commit refused for a reason confined to this post.
    Rejected,
    LedgerError(LeadScoutError),
}

impl ScrapeCoordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        scraper: Arc<dyn EngagementScraper>,
        notifier: Arc<dyn NotifyBackend>,
        config: ScrapeConfig,
    ) -> Self {
        let budget = BudgetTracker::new(config.cycle_budget_cents);
        let slots = Semaphore::new(config.concurrency.max(1));
        Self {
            ledger,
            scraper,
            notifier,
            config,
            budget,
            slots,
        }
    }

    pub async fn run(&self, scheduled: &[ScheduledPost]) -> Result<ScrapeStats> {
        let mut stats = ScrapeStats {
            selected: scheduled.len() as u32,
            ..ScrapeStats::default()
        };
        if scheduled.is_empty() {
            return Ok(stats);
        }

        info!(
            posts = scheduled.len(),
            concurrency = self.config.concurrency,
            "Starting scrapes"
        );

        let halted = AtomicBool::new(false);
        let outcomes: Vec<(String, PostOutcome)> = stream::iter(scheduled)
            .map(|post| {
                let halted = &halted;
                async move { (post.post_url.clone(), self.process(post, halted).await) }
            })
            // Twice the slot count so commits overlap the next provider calls.
            .buffer_unordered(self.config.concurrency.max(1) * 2)
            .collect()
            .await;

        let mut fatal: Option<LeadScoutError> = None;
        for (post_url, outcome) in outcomes {
            match outcome {
                PostOutcome::Committed {
                    status,
                    receipt,
                    dedup,
                    cost_usd,
                } => {
                    match status {
                        ScrapeStatus::Success => stats.succeeded += 1,
                        ScrapeStatus::FailedTransient => stats.failed_transient += 1,
                        ScrapeStatus::FailedPermanent => stats.failed_permanent += 1,
                        ScrapeStatus::Skipped => stats.skipped_invalid += 1,
                    }
                    stats.engagers_inserted += receipt.engagers_inserted as u32;
                    stats.engagers_existing += receipt.engagers_existing as u32;
                    stats.records_dropped += dedup.dropped_invalid as u32;
                    stats.records_collapsed += dedup.collapsed as u32;
                    stats.cost_usd += cost_usd;
                }
                PostOutcome::OverBudget => stats.skipped_budget += 1,
                PostOutcome::NotLaunched => {}
                PostOutcome::Inconsistent => stats.inconsistent += 1,
                PostOutcome::Rejected => {}
                PostOutcome::LedgerError(e) => {
                    error!(post_url = %post_url, error = %e, "Ledger failed while committing scrape");
                    fatal.get_or_insert(e);
                }
            }
        }

        self.budget.log_status();
        info!(
            succeeded = stats.succeeded,
            failed_transient = stats.failed_transient,
            failed_permanent = stats.failed_permanent,
            skipped_invalid = stats.skipped_invalid,
            skipped_budget = stats.skipped_budget,
            inconsistent = stats.inconsistent,
            engagers_inserted = stats.engagers_inserted,
            cost_usd = stats.cost_usd,
            "Scrapes complete"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn process(&self, post: &ScheduledPost, halted: &AtomicBool) -> PostOutcome {
        if halted.load(Ordering::Relaxed) {
            return PostOutcome::NotLaunched;
        }

        let (commit, dedup, cost_usd) = if !is_linkedin_post_url(&post.post_url) {
            warn!(post_url = %post.post_url, "Not a recognizable LinkedIn post URL, recording skipped attempt");
            let commit = ScrapeCommit::failure(
                &post.post_url,
                Utc::now(),
                ScrapeStatus::Skipped,
                0.0,
                "not a recognizable LinkedIn post URL",
            );
            (commit, DedupStats::default(), 0.0)
        } else {
            let Ok(permit) = self.slots.acquire().await else {
                return PostOutcome::NotLaunched;
            };
            if halted.load(Ordering::Relaxed) {
                return PostOutcome::NotLaunched;
            }
            let reserved = self.config.estimated_scrape_cents;
            if !self.budget.try_reserve(reserved) {
                info!(post_url = %post.post_url, "Cycle budget exhausted, leaving post for a later cycle");
                return PostOutcome::OverBudget;
            }

            let ran_at = Utc::now();
            let result = match timeout(self.config.call_timeout, self.scraper.scrape(&post.post_url)).await {
                Ok(result) => result,
                Err(_) => Err(ScrapeFailure::from(LeadScoutError::timeout(
                    "scrape",
                    self.config.call_timeout.as_secs(),
                ))),
            };
            drop(permit);

            let cost_usd = match &result {
                Ok(r) => r.cost_usd,
                Err(f) => f.cost_usd,
            };
            self.budget.settle(reserved, cost_usd);
            let (commit, dedup) = build_commit(&post.post_url, ran_at, result);
            (commit, dedup, cost_usd)
        };

        let status = commit.status;
        match self.ledger.commit_scrape(commit).await {
            Ok(receipt) => PostOutcome::Committed {
                status,
                receipt,
                dedup,
                cost_usd,
            },
            Err(LeadScoutError::StateInconsistency {
                post_url,
                scrape_count,
                event_count,
            }) => {
                error!(
                    post_url = %post_url,
                    scrape_count,
                    event_count,
                    "Post disagrees with its scrape history, skipping it"
                );
                let alert = Alert::StateInconsistency {
                    post_url,
                    scrape_count,
                    event_count,
                };
                if let Err(e) = self.notifier.send(&alert).await {
                    warn!(error = %e, "Failed to send inconsistency alert");
                }
                PostOutcome::Inconsistent
            }
            Err(e) if e.is_cycle_fatal() => {
                halted.store(true, Ordering::Relaxed);
                PostOutcome::LedgerError(e)
            }
            Err(e) => {
                // Anything else is confined to this post.
                warn!(post_url = %post.post_url, error = %e, "Scrape commit rejected");
                PostOutcome::Rejected
            }
        }
    }
}

/// Turn a scrape result into the ledger unit that records it.
fn build_commit(
    post_url: &str,
    ran_at: DateTime<Utc>,
    result: std::result::Result<ScrapeResult, ScrapeFailure>,
) -> (ScrapeCommit, DedupStats) {
    match result {
        Ok(scraped) => {
            let prepared = dedup::prepare(&scraped.records);
            let reactions = scraped
                .total_reactions
                .unwrap_or(scraped.records.len() as i64)
                .clamp(0, i64::from(i32::MAX)) as i32;
            info!(
                post_url,
                reactions,
                records = scraped.records.len(),
                kept = prepared.stats.kept,
                cost_usd = scraped.cost_usd,
                "Scrape succeeded"
            );
            let commit = ScrapeCommit::success(post_url, ran_at, reactions, scraped.cost_usd, prepared.engagers);
            (commit, prepared.stats)
        }
        Err(failure) => {
            let status = ScrapeStatus::for_error(&failure.error);
            warn!(post_url, %status, error = %failure.error, cost_usd = failure.cost_usd, "Scrape failed");
            let commit = ScrapeCommit::failure(
                post_url,
                ran_at,
                status,
                failure.cost_usd,
                failure.error.to_string(),
            );
            (commit, DedupStats::default())
        }
    }
}
