use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;

use leadscout_common::{EnrichConfig, MediaConfig, Result, SchedulerConfig, ScrapeConfig, SyncConfig};
use leadscout_ledger::{CycleRecord, Ledger};

use crate::notify::{Alert, NoopBackend, NotifyBackend};
use crate::pipeline::{CycleStats, EnrichmentStage, LeadSyncEngine, PostMediaStage, ScrapeCoordinator};
use crate::scheduling::{PostScheduler, ScheduleResult};
use crate::traits::{CrmPusher, EngagementScraper, PostMediaScraper, ProfileEnricher};

/// Everything one cycle needs. Built once in the binary, cloned freely.
///
/// Leaving `media`, `enricher` or `crm` unset skips that stage.
#[derive(Clone, TypedBuilder)]
pub struct CycleDeps {
    pub ledger: Arc<dyn Ledger>,
    pub scraper: Arc<dyn EngagementScraper>,
    #[builder(default, setter(strip_option))]
    pub media: Option<Arc<dyn PostMediaScraper>>,
    #[builder(default, setter(strip_option))]
    pub enricher: Option<Arc<dyn ProfileEnricher>>,
    #[builder(default, setter(strip_option))]
    pub crm: Option<Arc<dyn CrmPusher>>,
    #[builder(default = Arc::new(NoopBackend))]
    pub notifier: Arc<dyn NotifyBackend>,
    #[builder(default)]
    pub scheduler: SchedulerConfig,
    #[builder(default)]
    pub scrape: ScrapeConfig,
    #[builder(default)]
    pub media_config: MediaConfig,
    #[builder(default)]
    pub enrich: EnrichConfig,
    #[builder(default)]
    pub sync: SyncConfig,
}

/// Drives select -> scrape -> post media -> enrich -> sync, one stage after another.
pub struct Cycle {
    deps: CycleDeps,
}

impl Cycle {
    pub fn new(deps: CycleDeps) -> Self {
        Self { deps }
    }

    /// The selection a cycle started now would make. Writes nothing.
    pub async fn plan(&self) -> Result<ScheduleResult> {
        let posts = self.deps.ledger.posts().await?;
        Ok(PostScheduler::new(self.deps.scheduler.clone()).schedule(&posts, Utc::now()))
    }

    /// Run one full cycle and log it to the cycle table.
    ///
    /// Per-post failures are already inside the stats. An error here means
    /// the ledger or configuration failed and the cycle stopped early; the
    /// partial stats are still recorded.
    pub async fn run(&self) -> Result<CycleStats> {
        let started_at = Utc::now();
        let cycle_id = cycle_id(started_at);
        info!(cycle_id = %cycle_id, "Cycle started");

        let mut stats = CycleStats::default();
        let outcome = self.run_stages(&mut stats).await;

        let error = outcome.as_ref().err().map(|e| e.to_string());
        let record = CycleRecord {
            cycle_id: cycle_id.clone(),
            started_at,
            finished_at: Utc::now(),
            stats: serde_json::json!({ "stats": &stats, "error": &error }),
        };
        if let Err(e) = self.deps.ledger.record_cycle(&record).await {
            warn!(cycle_id = %cycle_id, error = %e, "Failed to record cycle run");
        }

        match outcome {
            Ok(()) => {
                info!(cycle_id = %cycle_id, "{stats}");
                if let Err(e) = self.deps.notifier.send_digest(&stats).await {
                    warn!(error = %e, "Failed to send cycle digest");
                }
                Ok(stats)
            }
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "Cycle aborted");
                let alert = Alert::CycleFailed {
                    cycle_id,
                    error: e.to_string(),
                };
                if let Err(send_err) = self.deps.notifier.send(&alert).await {
                    warn!(error = %send_err, "Failed to send cycle failure alert");
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, stats: &mut CycleStats) -> Result<()> {
        let deps = &self.deps;

        let plan = self.plan().await?;
        stats.deferred = plan.deferred as u32;
        stats.schedule_skipped = plan.skipped;
        info!(
            selected = plan.scheduled.len(),
            deferred = plan.deferred,
            exhausted = plan.skipped.exhausted,
            cooling_down = plan.skipped.cooling_down,
            diminishing_returns = plan.skipped.diminishing_returns,
            "Posts scheduled"
        );

        let coordinator = ScrapeCoordinator::new(
            deps.ledger.clone(),
            deps.scraper.clone(),
            deps.notifier.clone(),
            deps.scrape.clone(),
        );
        stats.scrape = coordinator.run(&plan.scheduled).await?;

        match &deps.media {
            Some(scraper) => {
                let stage = PostMediaStage::new(deps.ledger.clone(), scraper.clone(), deps.media_config.clone());
                stats.media = Some(stage.run().await?);
            }
            None => info!("Post media lookup disabled for this cycle"),
        }

        match &deps.enricher {
            Some(enricher) => {
                let stage = EnrichmentStage::new(deps.ledger.clone(), enricher.clone(), deps.enrich.clone());
                stats.enrich = Some(stage.run().await?);
            }
            None => info!("Enrichment disabled for this cycle"),
        }

        match &deps.crm {
            Some(crm) => {
                let engine = LeadSyncEngine::new(deps.ledger.clone(), crm.clone(), deps.sync.clone());
                stats.sync = Some(engine.run().await?);
            }
            None => info!("Lead sync disabled for this cycle"),
        }

        Ok(())
    }
}

fn cycle_id(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cycle_ids_sort_by_start_time() {
        let a = cycle_id(Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap());
        let b = cycle_id(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(a, "20260301T090500.000Z");
        assert!(a < b);
    }
}
