use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use leadscout_common::{EnrichConfig, LeadScoutError, ProfileEnrichment, Result};
use leadscout_ledger::Ledger;

use super::stats::EnrichStats;
use crate::traits::ProfileEnricher;

/// Fills in company, title and audience for engagers that have none yet.
///
/// One provider call per distinct profile, run one at a time. Every row for
/// that profile gets the result, whichever post it came from.
pub struct EnrichmentStage {
    ledger: Arc<dyn Ledger>,
    enricher: Arc<dyn ProfileEnricher>,
    config: EnrichConfig,
}

impl EnrichmentStage {
    pub fn new(ledger: Arc<dyn Ledger>, enricher: Arc<dyn ProfileEnricher>, config: EnrichConfig) -> Self {
        Self {
            ledger,
            enricher,
            config,
        }
    }

    pub async fn run(&self) -> Result<EnrichStats> {
        let profiles = self
            .ledger
            .profiles_needing_enrichment(self.config.max_per_cycle)
            .await?;
        let mut stats = EnrichStats {
            profiles: profiles.len() as u32,
            ..EnrichStats::default()
        };
        if profiles.is_empty() {
            return Ok(stats);
        }
        info!(profiles = profiles.len(), "Enriching engager profiles");

        for profile_url in &profiles {
            let outcome = match timeout(self.config.call_timeout, self.enricher.enrich(profile_url)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LeadScoutError::timeout(
                    "enrichment",
                    self.config.call_timeout.as_secs(),
                )),
            };

            let enrichment = match outcome {
                Ok(enrichment) => enrichment,
                Err(e) if e.is_transient() => {
                    warn!(profile_url = %profile_url, error = %e, "Enrichment failed, will retry next cycle");
                    stats.failed += 1;
                    continue;
                }
                Err(e) => {
                    // Stamp unenriched rows anyway; asking again would fail the same way.
                    warn!(profile_url = %profile_url, error = %e, "Enrichment failed permanently");
                    stats.failed += 1;
                    ProfileEnrichment::default()
                }
            };

            if enrichment.is_empty() {
                stats.empty += 1;
            } else {
                stats.enriched += 1;
            }
            stats.rows_updated += self
                .ledger
                .record_enrichment(profile_url, &enrichment, Utc::now())
                .await?;
        }

        info!(
            enriched = stats.enriched,
            empty = stats.empty,
            failed = stats.failed,
            rows_updated = stats.rows_updated,
            "Enrichment complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use leadscout_common::{EngagementType, NewEngager, PostSeed};
    use leadscout_ledger::{MemoryLedger, ScrapeCommit};

    use super::*;
    use crate::testing::MockEnricher;

    const POST_A: &str = "https://www.linkedin.com/posts/acme_a-activity-1";
    const POST_B: &str = "https://www.linkedin.com/posts/acme_b-activity-2";
    const ADA: &str = "https://www.linkedin.com/in/ada";
    const GRACE: &str = "https://www.linkedin.com/in/grace";

    fn engager(url: &str) -> NewEngager {
        NewEngager {
            profile_url: url.to_string(),
            name: None,
            headline: None,
            engagement_type: EngagementType::Reaction,
        }
    }

    async fn seeded() -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .upsert_posts(&[
                PostSeed {
                    post_url: POST_A.into(),
                    post_name: None,
                },
                PostSeed {
                    post_url: POST_B.into(),
                    post_name: None,
                },
            ])
            .await
            .unwrap();
        ledger
            .commit_scrape(ScrapeCommit::success(POST_A, Utc::now(), 2, 0.0, vec![engager(ADA), engager(GRACE)]))
            .await
            .unwrap();
        ledger
            .commit_scrape(ScrapeCommit::success(POST_B, Utc::now(), 1, 0.0, vec![engager(ADA)]))
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn one_call_per_profile_updates_every_row() {
        let ledger = seeded().await;
        let enricher = Arc::new(MockEnricher::new().on_profile(
            ADA,
            ProfileEnrichment {
                company: Some("Analytical Engines Ltd".into()),
                title: Some("Programmer".into()),
                audience: Some("engineering".into()),
            },
        ));

        let stats = EnrichmentStage::new(ledger.clone(), enricher.clone(), EnrichConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(stats.profiles, 2);
        assert_eq!(stats.enriched, 1);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.rows_updated, 3);
        assert_eq!(enricher.calls(), vec![ADA.to_string(), GRACE.to_string()]);

        let ada_rows: Vec<_> = ledger
            .all_engagers()
            .into_iter()
            .filter(|e| e.profile_url == ADA)
            .collect();
        assert_eq!(ada_rows.len(), 2);
        assert!(ada_rows.iter().all(|e| e.company.as_deref() == Some("Analytical Engines Ltd")));
        assert!(ada_rows.iter().all(|e| !e.pushed_to_crm));
    }

    #[tokio::test]
    async fn transient_failure_leaves_profile_for_next_cycle() {
        let ledger = seeded().await;
        let enricher = Arc::new(
            MockEnricher::new().on_failure(ADA, LeadScoutError::TransientExternal("502".into())),
        );

        let stats = EnrichmentStage::new(ledger.clone(), enricher, EnrichConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(stats.failed, 1);
        let pending = ledger.profiles_needing_enrichment(10).await.unwrap();
        assert_eq!(pending, vec![ADA.to_string()]);
    }

    #[tokio::test]
    async fn nothing_pending_makes_no_calls() {
        let ledger = seeded().await;
        let enricher = Arc::new(MockEnricher::new());
        let stage = EnrichmentStage::new(ledger, enricher.clone(), EnrichConfig::default());

        stage.run().await.unwrap();
        let second = stage.run().await.unwrap();

        assert_eq!(second.profiles, 0);
        assert_eq!(enricher.calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_lookup_keeps_enrichment_from_an_earlier_post() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .upsert_posts(&[
                PostSeed {
                    post_url: POST_A.into(),
                    post_name: None,
                },
                PostSeed {
                    post_url: POST_B.into(),
                    post_name: None,
                },
            ])
            .await
            .unwrap();
        ledger
            .commit_scrape(ScrapeCommit::success(POST_A, Utc::now(), 1, 0.0, vec![engager(ADA)]))
            .await
            .unwrap();
        let found = Arc::new(MockEnricher::new().on_profile(
            ADA,
            ProfileEnrichment {
                company: Some("Acme".into()),
                title: Some("CTO".into()),
                audience: None,
            },
        ));
        EnrichmentStage::new(ledger.clone(), found, EnrichConfig::default())
            .run()
            .await
            .unwrap();

        // Ada shows up again on another post and the provider now refuses.
        ledger
            .commit_scrape(ScrapeCommit::success(POST_B, Utc::now(), 1, 0.0, vec![engager(ADA)]))
            .await
            .unwrap();
        let gone = Arc::new(MockEnricher::new().on_failure(ADA, LeadScoutError::PermanentExternal("404".into())));
        let stats = EnrichmentStage::new(ledger.clone(), gone, EnrichConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.rows_updated, 1);
        let a_row = ledger
            .all_engagers()
            .into_iter()
            .find(|e| e.post_url == POST_A)
            .unwrap();
        assert_eq!(a_row.company.as_deref(), Some("Acme"));
        assert_eq!(a_row.title.as_deref(), Some("CTO"));
        assert!(ledger.profiles_needing_enrichment(10).await.unwrap().is_empty());
        let candidates = ledger.lead_candidates(10).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].post_url, POST_A);
    }
}
