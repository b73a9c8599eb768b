use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{info, warn};

use leadscout_common::{LeadCandidate, LeadScoutError, PushOutcome, Result, SyncConfig};
use leadscout_ledger::Ledger;

use super::stats::SyncStats;
use crate::traits::CrmPusher;

/// Forwards qualified engagers to the CRM, marking each row exactly once.
///
/// The flag is flipped only after the CRM confirms, and only on rows that
/// are still unflagged at that moment. A crash between push and mark means
/// the person is pushed again next cycle; the CRM's own duplicate detection
/// absorbs that.
pub struct LeadSyncEngine {
    ledger: Arc<dyn Ledger>,
    crm: Arc<dyn CrmPusher>,
    config: SyncConfig,
}

/// All unforwarded rows for one person. One CRM call covers them all.
#[derive(Debug, Clone)]
pub struct PersonLeads {
    pub profile_url: String,
    pub rows: Vec<LeadCandidate>,
}

impl PersonLeads {
    /// The row whose attributes go to the CRM: the earliest sighting.
    pub fn primary(&self) -> &LeadCandidate {
        &self.rows[0]
    }

    fn engager_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.iter().map(|r| r.engager_id)
    }
}

/// Group candidate rows by profile, keeping first-appearance order.
pub fn group_by_person(candidates: Vec<LeadCandidate>) -> Vec<PersonLeads> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut people: Vec<PersonLeads> = Vec::new();
    for row in candidates {
        match index.get(&row.profile_url) {
            Some(&i) => people[i].rows.push(row),
            None => {
                index.insert(row.profile_url.clone(), people.len());
                people.push(PersonLeads {
                    profile_url: row.profile_url.clone(),
                    rows: vec![row],
                });
            }
        }
    }
    people
}

impl LeadSyncEngine {
    pub fn new(ledger: Arc<dyn Ledger>, crm: Arc<dyn CrmPusher>, config: SyncConfig) -> Self {
        Self { ledger, crm, config }
    }

    pub async fn run(&self) -> Result<SyncStats> {
        let candidates = self.ledger.lead_candidates(self.config.max_per_cycle).await?;
        let mut stats = SyncStats {
            candidates: candidates.len() as u32,
            ..SyncStats::default()
        };
        if candidates.is_empty() {
            info!("No leads to forward");
            return Ok(stats);
        }

        let people = group_by_person(candidates);
        stats.people = people.len() as u32;
        info!(people = people.len(), rows = stats.candidates, "Forwarding leads to CRM");

        for batch in people.chunks(self.config.batch_size.max(1)) {
            let mut confirmed: Vec<i64> = Vec::new();

            for person in batch {
                let outcome = match timeout(self.config.call_timeout, self.crm.push(person.primary())).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LeadScoutError::timeout(
                        "CRM push",
                        self.config.call_timeout.as_secs(),
                    )),
                };

                match outcome {
                    Ok(PushOutcome::Created) => {
                        stats.created += 1;
                        confirmed.extend(person.engager_ids());
                    }
                    Ok(PushOutcome::Duplicate) => {
                        stats.duplicates += 1;
                        confirmed.extend(person.engager_ids());
                    }
                    Err(e) if e.is_transient() => {
                        warn!(profile_url = %person.profile_url, error = %e, "CRM push failed, will retry next cycle");
                        stats.failed_transient += 1;
                    }
                    Err(e) => {
                        warn!(profile_url = %person.profile_url, error = %e, "CRM rejected lead");
                        stats.failed_permanent += 1;
                    }
                }
            }

            if confirmed.is_empty() {
                continue;
            }
            let flipped = self.ledger.mark_forwarded(&confirmed, Utc::now()).await?;
            let raced = confirmed.len() - flipped.len();
            if raced > 0 {
                warn!(raced, "Leads already marked by another run, discarding our push result");
            }
            stats.rows_marked += flipped.len() as u32;
            stats.rows_raced += raced as u32;
        }

        info!(
            created = stats.created,
            duplicates = stats.duplicates,
            failed_transient = stats.failed_transient,
            failed_permanent = stats.failed_permanent,
            rows_marked = stats.rows_marked,
            rows_raced = stats.rows_raced,
            "Lead sync complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use leadscout_common::{EngagementType, NewEngager, PostSeed};
    use leadscout_ledger::{MemoryLedger, ScrapeCommit};

    use super::*;
    use crate::testing::MockCrm;

    const POST_A: &str = "https://www.linkedin.com/posts/acme_a-activity-1";
    const POST_B: &str = "https://www.linkedin.com/posts/acme_b-activity-2";
    const ADA: &str = "https://www.linkedin.com/in/ada";
    const GRACE: &str = "https://www.linkedin.com/in/grace";
    const LINUS: &str = "https://www.linkedin.com/in/linus";
    const ACME: &str = "https://www.linkedin.com/company/acme";

    fn engager(url: &str) -> NewEngager {
        NewEngager {
            profile_url: url.to_string(),
            name: Some("Someone Important".into()),
            headline: None,
            engagement_type: EngagementType::Reaction,
        }
    }

    /// Ada engaged with both posts, Grace with one; both enriched. Linus is
    /// half-enriched and Acme is a company page.
    async fn seeded() -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .upsert_posts(&[
                PostSeed {
                    post_url: POST_A.into(),
                    post_name: Some("Launch".into()),
                },
                PostSeed {
                    post_url: POST_B.into(),
                    post_name: Some("Recap".into()),
                },
            ])
            .await
            .unwrap();
        ledger
            .commit_scrape(ScrapeCommit::success(
                POST_A,
                Utc::now(),
                4,
                0.0,
                vec![engager(ADA), engager(GRACE), engager(LINUS), engager(ACME)],
            ))
            .await
            .unwrap();
        ledger
            .commit_scrape(ScrapeCommit::success(POST_B, Utc::now(), 1, 0.0, vec![engager(ADA)]))
            .await
            .unwrap();

        for e in ledger.all_engagers() {
            match e.profile_url.as_str() {
                ADA | GRACE | ACME => ledger.enrich_engager(e.id, "Acme", "Engineer"),
                LINUS => ledger.enrich_engager(e.id, "Acme", "  "),
                _ => {}
            }
        }
        ledger
    }

    fn engine(ledger: Arc<MemoryLedger>, crm: Arc<MockCrm>) -> LeadSyncEngine {
        LeadSyncEngine::new(ledger, crm, SyncConfig::default())
    }

    #[tokio::test]
    async fn one_push_per_person_marks_all_their_rows() {
        let ledger = seeded().await;
        let crm = Arc::new(MockCrm::new());

        let stats = engine(ledger.clone(), crm.clone()).run().await.unwrap();

        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.people, 2);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.rows_marked, 3);
        assert_eq!(crm.pushed(), vec![ADA.to_string(), GRACE.to_string()]);

        let pushed: Vec<_> = ledger.all_engagers().into_iter().filter(|e| e.pushed_to_crm).collect();
        assert_eq!(pushed.len(), 3);
        assert!(pushed.iter().all(|e| e.pushed_at.is_some()));
    }

    #[tokio::test]
    async fn second_run_makes_no_crm_calls() {
        let ledger = seeded().await;
        let crm = Arc::new(MockCrm::new());
        let sync = engine(ledger, crm.clone());

        sync.run().await.unwrap();
        let second = sync.run().await.unwrap();

        assert_eq!(second.candidates, 0);
        assert_eq!(crm.pushed().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_counts_as_forwarded() {
        let ledger = seeded().await;
        let crm = Arc::new(MockCrm::new().duplicate(ADA));

        let stats = engine(ledger.clone(), crm).run().await.unwrap();

        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.created, 1);
        assert!(ledger.lead_candidates(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_leave_the_flag_false() {
        let ledger = seeded().await;
        let crm = Arc::new(
            MockCrm::new()
                .failing(ADA, LeadScoutError::TransientExternal("503".into()))
                .failing(GRACE, LeadScoutError::PermanentExternal("400 INVALID_EMAIL".into())),
        );

        let stats = engine(ledger.clone(), crm.clone()).run().await.unwrap();

        assert_eq!(stats.failed_transient, 1);
        assert_eq!(stats.failed_permanent, 1);
        assert_eq!(stats.rows_marked, 0);
        // One attempt each; no retry inside the cycle.
        assert_eq!(crm.pushed().len(), 2);
        assert_eq!(ledger.lead_candidates(100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rows_flipped_by_another_run_are_reported_as_raced() {
        let ledger = seeded().await;
        let racer = ledger.clone();
        // Another run marks Grace while our push for her is in flight.
        let crm = Arc::new(MockCrm::new().on_push(move |lead| {
            if lead.profile_url == GRACE {
                futures::executor::block_on(racer.mark_forwarded(&[lead.engager_id], Utc::now())).unwrap();
            }
        }));

        let stats = engine(ledger.clone(), crm).run().await.unwrap();

        assert_eq!(stats.created, 2);
        assert_eq!(stats.rows_raced, 1);
        assert_eq!(stats.rows_marked, 2);
        let grace: Vec<_> = ledger
            .all_engagers()
            .into_iter()
            .filter(|e| e.profile_url == GRACE)
            .collect();
        assert!(grace[0].pushed_to_crm);
    }

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let row = |id: i64, url: &str| LeadCandidate {
            engager_id: id,
            post_url: POST_A.into(),
            post_name: None,
            profile_url: url.into(),
            name: None,
            headline: None,
            company: Some("Acme".into()),
            title: Some("CTO".into()),
            audience: None,
        };
        let people = group_by_person(vec![row(1, GRACE), row(2, ADA), row(3, GRACE)]);

        assert_eq!(people.len(), 2);
        assert_eq!(people[0].profile_url, GRACE);
        assert_eq!(people[0].rows.len(), 2);
        assert_eq!(people[0].primary().engager_id, 1);
    }
}
