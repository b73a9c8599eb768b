//! Whole-cycle tests against the in-memory ledger and mock capabilities.

use std::sync::Arc;

use chrono::{Duration, Utc};

use leadscout_common::{EngagementType, ProfileEnrichment};
use leadscout_ledger::{Ledger, MemoryLedger};
use leadscout_scout::cycle::{Cycle, CycleDeps};
use leadscout_scout::notify::Alert;
use leadscout_scout::scheduling::ScheduleReason;
use leadscout_scout::testing::{
    post_fixture, reaction, video, MockCrm, MockEnricher, MockMediaScraper, MockScraper,
    RecordingNotifier,
};

const FRESH: &str = "https://www.linkedin.com/posts/acme_launch-activity-1";
const STALE: &str = "https://www.linkedin.com/posts/acme_recap-activity-2";
const DEAD: &str = "https://www.linkedin.com/posts/acme_quiet-activity-3";
const ADA: &str = "https://www.linkedin.com/in/ada";
const GRACE: &str = "https://www.linkedin.com/in/grace";

/// FRESH was never scraped. STALE has one attempt left and was last seen
/// three days ago. DEAD was scraped twice with zero reactions.
fn seeded() -> Arc<MemoryLedger> {
    let now = Utc::now();
    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert_post(post_fixture(1, FRESH, 0, 0, None, now - Duration::days(1)));
    ledger.insert_post(post_fixture(
        2,
        STALE,
        4,
        10,
        Some(now - Duration::days(3)),
        now - Duration::days(30),
    ));
    ledger.insert_post(post_fixture(
        3,
        DEAD,
        2,
        0,
        Some(now - Duration::days(5)),
        now - Duration::days(30),
    ));
    ledger
}

fn scraper() -> MockScraper {
    MockScraper::new()
        .on_post_with_cost(
            FRESH,
            vec![
                reaction(ADA, EngagementType::Reaction),
                reaction(GRACE, EngagementType::Comment),
            ],
            Some(2),
            0.04,
        )
        .on_post(STALE, vec![reaction(ADA, EngagementType::Reaction)], Some(12))
}

fn enricher() -> MockEnricher {
    MockEnricher::new().on_profile(
        ADA,
        ProfileEnrichment {
            company: Some("Analytical Engines Ltd".into()),
            title: Some("Programmer".into()),
            audience: None,
        },
    )
}

#[tokio::test]
async fn full_cycle_scrapes_enriches_and_forwards() {
    let ledger = seeded();
    let crm = Arc::new(MockCrm::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let cycle = Cycle::new(
        CycleDeps::builder()
            .ledger(ledger.clone())
            .scraper(Arc::new(scraper()))
            .media(Arc::new(MockMediaScraper::new().on_post(FRESH, video(20.0))))
            .enricher(Arc::new(enricher()))
            .crm(crm.clone())
            .notifier(notifier.clone())
            .build(),
    );

    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.scrape.selected, 2);
    assert_eq!(stats.schedule_skipped.diminishing_returns, 1);
    assert_eq!(stats.scrape.succeeded, 2);
    assert_eq!(stats.scrape.engagers_inserted, 3);

    // Media is looked up for every tracked post, dead ones included.
    let media = stats.media.unwrap();
    assert_eq!(media.posts, 3);
    assert_eq!(media.with_media, 1);
    assert_eq!(ledger.post_media(FRESH).await.unwrap(), Some(video(20.0)));
    assert!(ledger.posts_needing_media(10).await.unwrap().is_empty());

    let enrich = stats.enrich.unwrap();
    assert_eq!(enrich.enriched, 1);
    assert_eq!(enrich.empty, 1);

    // Ada engaged with both posts: one contact, both rows marked. Grace has no title.
    let sync = stats.sync.unwrap();
    assert_eq!(sync.people, 1);
    assert_eq!(sync.created, 1);
    assert_eq!(sync.rows_marked, 2);
    assert_eq!(crm.pushed(), vec![ADA.to_string()]);

    let stale = ledger.post(STALE).await.unwrap().unwrap();
    assert_eq!(stale.scrape_count, 5);
    assert_eq!(stale.total_reactions, 12);
    assert_eq!(ledger.scrape_events(STALE).await.unwrap().len(), 5);
    assert!(ledger.audit().await.unwrap().is_empty());

    assert_eq!(ledger.cycles().len(), 1);
    assert_eq!(notifier.digests(), 1);
    assert!(notifier.alerts().is_empty());
}

#[tokio::test]
async fn second_cycle_has_nothing_left_to_do() {
    let ledger = seeded();
    let scraper = Arc::new(scraper());
    let media = Arc::new(MockMediaScraper::new());
    let enricher = Arc::new(enricher());
    let crm = Arc::new(MockCrm::new());
    let cycle = Cycle::new(
        CycleDeps::builder()
            .ledger(ledger.clone())
            .scraper(scraper.clone())
            .media(media.clone())
            .enricher(enricher.clone())
            .crm(crm.clone())
            .build(),
    );

    cycle.run().await.unwrap();
    let second = cycle.run().await.unwrap();

    // FRESH is cooling down, STALE is out of attempts, DEAD stays dead.
    assert_eq!(second.scrape.selected, 0);
    assert_eq!(second.schedule_skipped.cooling_down, 1);
    assert_eq!(second.schedule_skipped.exhausted, 1);
    assert_eq!(second.media.unwrap().posts, 0);
    assert_eq!(second.enrich.unwrap().profiles, 0);
    assert_eq!(second.sync.unwrap().candidates, 0);

    assert_eq!(scraper.calls(), 2);
    assert_eq!(media.calls().len(), 3);
    assert_eq!(enricher.calls().len(), 2);
    assert_eq!(crm.pushed().len(), 1);
}

#[tokio::test]
async fn plan_orders_fresh_first_and_writes_nothing() {
    let ledger = seeded();
    let scraper = Arc::new(scraper());
    let cycle = Cycle::new(
        CycleDeps::builder()
            .ledger(ledger.clone())
            .scraper(scraper.clone())
            .build(),
    );

    let plan = cycle.plan().await.unwrap();

    let order: Vec<_> = plan.scheduled.iter().map(|p| (p.post_url.as_str(), p.reason)).collect();
    assert_eq!(
        order,
        vec![(FRESH, ScheduleReason::NeverScraped), (STALE, ScheduleReason::Stale)]
    );
    assert_eq!(scraper.calls(), 0);
    assert_eq!(ledger.post(FRESH).await.unwrap().unwrap().scrape_count, 0);
    assert!(ledger.cycles().is_empty());
}

#[tokio::test]
async fn skipped_stages_are_left_out_of_the_stats() {
    let ledger = seeded();
    let cycle = Cycle::new(
        CycleDeps::builder()
            .ledger(ledger.clone())
            .scraper(Arc::new(scraper()))
            .build(),
    );

    let stats = cycle.run().await.unwrap();

    assert_eq!(stats.scrape.succeeded, 2);
    assert!(stats.media.is_none());
    assert!(stats.enrich.is_none());
    assert!(stats.sync.is_none());
    assert!(ledger.all_engagers().iter().all(|e| e.enriched_at.is_none()));
}

#[tokio::test]
async fn ledger_failure_aborts_the_cycle_and_alerts() {
    let ledger = seeded();
    ledger.fail_commits(true);
    let crm = Arc::new(MockCrm::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let cycle = Cycle::new(
        CycleDeps::builder()
            .ledger(ledger.clone())
            .scraper(Arc::new(scraper()))
            .crm(crm.clone())
            .notifier(notifier.clone())
            .build(),
    );

    let err = cycle.run().await.unwrap_err();

    assert!(err.is_cycle_fatal());
    assert!(crm.pushed().is_empty());
    assert_eq!(notifier.digests(), 0);
    assert!(matches!(notifier.alerts().as_slice(), [Alert::CycleFailed { .. }]));

    let cycles = ledger.cycles();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].stats["error"].as_str().unwrap().contains("connection refused"));
}
