//! In-memory ledger for tests. Same contract as `PgLedger`, one mutex for
//! the whole state so every method is trivially atomic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadscout_common::{
    is_person_profile_url, Engager, LeadCandidate, LeadScoutError, Post, PostMedia, PostSeed,
    ProfileEnrichment, Result, ScrapeEvent, ScrapeStatus,
};

use crate::ledger::{CommitReceipt, CountMismatch, CycleRecord, Ledger, ScrapeCommit, UpsertStats};

#[derive(Default)]
struct State {
    posts: Vec<Post>,
    events: Vec<ScrapeEvent>,
    engagers: Vec<Engager>,
    media: HashMap<String, PostMedia>,
    cycles: Vec<CycleRecord>,
    next_event_id: i64,
    next_engager_id: i64,
    fail_commits: bool,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a post exactly as given, counters and timestamps included.
    ///
    /// For posts that claim prior attempts, matching placeholder events are
    /// added so the count invariant holds.
    pub fn insert_post(&self, post: Post) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..post.scrape_count {
            state.next_event_id += 1;
            let event = ScrapeEvent {
                id: state.next_event_id,
                post_url: post.post_url.clone(),
                ran_at: post.last_scraped_at.unwrap_or(post.created_at),
                reactions_count: Some(post.total_reactions),
                cost_usd: 0.0,
                status: ScrapeStatus::Success,
                error: None,
            };
            state.events.push(event);
        }
        state.posts.push(post);
    }

    /// Overwrite a post's `scrape_count` without touching its history.
    pub fn corrupt_scrape_count(&self, post_url: &str, scrape_count: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(post) = state.posts.iter_mut().find(|p| p.post_url == post_url) {
            post.scrape_count = scrape_count;
        }
    }

    /// Make every subsequent `commit_scrape` fail as if the database went away.
    pub fn fail_commits(&self, fail: bool) {
        self.state.lock().unwrap().fail_commits = fail;
    }

    pub fn all_engagers(&self) -> Vec<Engager> {
        self.state.lock().unwrap().engagers.clone()
    }

    pub fn cycles(&self) -> Vec<CycleRecord> {
        self.state.lock().unwrap().cycles.clone()
    }

    /// Set enrichment fields directly, bypassing the enrichment stage.
    pub fn enrich_engager(&self, engager_id: i64, company: &str, title: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.engagers.iter_mut().find(|e| e.id == engager_id) {
            e.company = Some(company.to_string());
            e.title = Some(title.to_string());
            e.enriched_at = Some(Utc::now());
        }
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn upsert_posts(&self, seeds: &[PostSeed]) -> Result<UpsertStats> {
        let mut state = self.state.lock().unwrap();
        let mut stats = UpsertStats::default();

        for seed in seeds {
            let post_url = seed.post_url.trim();
            if post_url.is_empty() {
                stats.rejected += 1;
                continue;
            }
            let post_name = seed
                .post_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);

            match state.posts.iter().position(|p| p.post_url == post_url) {
                Some(idx) => {
                    let existing = &mut state.posts[idx];
                    if post_name.is_some() && existing.post_name != post_name {
                        existing.post_name = post_name;
                        stats.renamed += 1;
                    } else {
                        stats.unchanged += 1;
                    }
                }
                None => {
                    let id = state.posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                    state.posts.push(Post {
                        id,
                        post_url: post_url.to_string(),
                        post_name,
                        last_scraped_at: None,
                        scrape_count: 0,
                        total_reactions: 0,
                        enriched: false,
                        enriched_at: None,
                        created_at: Utc::now(),
                    });
                    stats.inserted += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn posts(&self) -> Result<Vec<Post>> {
        let mut posts = self.state.lock().unwrap().posts.clone();
        posts.sort_by_key(|p| p.id);
        Ok(posts)
    }

    async fn post(&self, post_url: &str) -> Result<Option<Post>> {
        let state = self.state.lock().unwrap();
        Ok(state.posts.iter().find(|p| p.post_url == post_url).cloned())
    }

    async fn commit_scrape(&self, commit: ScrapeCommit) -> Result<CommitReceipt> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commits {
            return Err(LeadScoutError::Database("connection refused".into()));
        }

        let Some(idx) = state.posts.iter().position(|p| p.post_url == commit.post_url) else {
            return Err(LeadScoutError::ConstraintViolation(format!(
                "unknown post {}",
                commit.post_url
            )));
        };

        let scrape_count = i64::from(state.posts[idx].scrape_count);
        let event_count = state
            .events
            .iter()
            .filter(|e| e.post_url == commit.post_url)
            .count() as i64;
        if scrape_count != event_count {
            return Err(LeadScoutError::StateInconsistency {
                post_url: commit.post_url,
                scrape_count,
                event_count,
            });
        }

        state.next_event_id += 1;
        let scrape_id = state.next_event_id;
        state.events.push(ScrapeEvent {
            id: scrape_id,
            post_url: commit.post_url.clone(),
            ran_at: commit.ran_at,
            reactions_count: commit.reactions,
            cost_usd: commit.cost_usd,
            status: commit.status,
            error: commit.error.clone(),
        });

        let post = &mut state.posts[idx];
        post.scrape_count += 1;
        post.last_scraped_at = Some(match post.last_scraped_at {
            Some(prev) if prev > commit.ran_at => prev,
            _ => commit.ran_at,
        });
        if let Some(reactions) = commit.reactions {
            post.total_reactions = reactions;
        }
        let new_count = post.scrape_count;

        let mut inserted = 0usize;
        for new in &commit.engagers {
            let exists = state
                .engagers
                .iter()
                .any(|e| e.profile_url == new.profile_url && e.post_url == commit.post_url);
            if exists {
                continue;
            }
            state.next_engager_id += 1;
            let id = state.next_engager_id;
            state.engagers.push(Engager {
                id,
                scrape_id,
                post_url: commit.post_url.clone(),
                profile_url: new.profile_url.clone(),
                name: new.name.clone(),
                headline: new.headline.clone(),
                engagement_type: new.engagement_type,
                company: None,
                title: None,
                audience: None,
                enriched_at: None,
                pushed_to_crm: false,
                pushed_at: None,
                created_at: commit.ran_at,
            });
            inserted += 1;
        }

        Ok(CommitReceipt {
            scrape_id,
            scrape_count: new_count,
            engagers_inserted: inserted,
            engagers_existing: commit.engagers.len() - inserted,
        })
    }

    async fn scrape_events(&self, post_url: &str) -> Result<Vec<ScrapeEvent>> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<ScrapeEvent> = state
            .events
            .iter()
            .filter(|e| e.post_url == post_url)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.ran_at.cmp(&b.ran_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn engagers_for_post(&self, post_url: &str) -> Result<Vec<Engager>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .engagers
            .iter()
            .filter(|e| e.post_url == post_url)
            .cloned()
            .collect())
    }

    async fn profiles_needing_enrichment(&self, limit: usize) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<String> = Vec::new();
        for e in &state.engagers {
            if out.len() >= limit {
                break;
            }
            if e.enriched_at.is_none()
                && is_person_profile_url(&e.profile_url)
                && !out.contains(&e.profile_url)
            {
                out.push(e.profile_url.clone());
            }
        }
        Ok(out)
    }

    async fn record_enrichment(
        &self,
        profile_url: &str,
        enrichment: &ProfileEnrichment,
        enriched_at: DateTime<Utc>,
    ) -> Result<u64> {
        let enrichment = enrichment.cleaned();
        let mut state = self.state.lock().unwrap();
        let mut touched = 0;
        for e in state.engagers.iter_mut().filter(|e| e.profile_url == profile_url) {
            if enrichment.is_empty() {
                if e.enriched_at.is_none() {
                    e.enriched_at = Some(enriched_at);
                    touched += 1;
                }
                continue;
            }
            if enrichment.company.is_some() {
                e.company = enrichment.company.clone();
            }
            if enrichment.title.is_some() {
                e.title = enrichment.title.clone();
            }
            if enrichment.audience.is_some() {
                e.audience = enrichment.audience.clone();
            }
            e.enriched_at = Some(enriched_at);
            touched += 1;
        }
        Ok(touched)
    }

    async fn posts_needing_media(&self, limit: usize) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut pending: Vec<&Post> = state.posts.iter().filter(|p| !p.enriched).collect();
        pending.sort_by_key(|p| p.id);
        Ok(pending
            .into_iter()
            .take(limit)
            .map(|p| p.post_url.clone())
            .collect())
    }

    async fn record_post_media(
        &self,
        post_url: &str,
        media: &PostMedia,
        enriched_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(post) = state
            .posts
            .iter_mut()
            .find(|p| p.post_url == post_url && !p.enriched)
        else {
            return Ok(false);
        };
        post.enriched = true;
        post.enriched_at = Some(enriched_at);
        state.media.insert(post_url.to_string(), media.clone());
        Ok(true)
    }

    async fn post_media(&self, post_url: &str) -> Result<Option<PostMedia>> {
        Ok(self.state.lock().unwrap().media.get(post_url).cloned())
    }

    async fn lead_candidates(&self, limit: usize) -> Result<Vec<LeadCandidate>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .engagers
            .iter()
            .filter(|e| !e.pushed_to_crm && e.is_qualified())
            .take(limit)
            .map(|e| LeadCandidate {
                engager_id: e.id,
                post_url: e.post_url.clone(),
                post_name: state
                    .posts
                    .iter()
                    .find(|p| p.post_url == e.post_url)
                    .and_then(|p| p.post_name.clone()),
                profile_url: e.profile_url.clone(),
                name: e.name.clone(),
                headline: e.headline.clone(),
                company: e.company.clone(),
                title: e.title.clone(),
                audience: e.audience.clone(),
            })
            .collect())
    }

    async fn mark_forwarded(&self, engager_ids: &[i64], pushed_at: DateTime<Utc>) -> Result<Vec<i64>> {
        let mut state = self.state.lock().unwrap();
        let mut flipped = Vec::new();
        for e in state.engagers.iter_mut() {
            if engager_ids.contains(&e.id) && !e.pushed_to_crm {
                e.pushed_to_crm = true;
                e.pushed_at = Some(pushed_at);
                flipped.push(e.id);
            }
        }
        Ok(flipped)
    }

    async fn audit(&self) -> Result<Vec<CountMismatch>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<CountMismatch> = state
            .posts
            .iter()
            .filter_map(|p| {
                let event_count = state.events.iter().filter(|e| e.post_url == p.post_url).count() as i64;
                (i64::from(p.scrape_count) != event_count).then(|| CountMismatch {
                    post_url: p.post_url.clone(),
                    scrape_count: i64::from(p.scrape_count),
                    event_count,
                })
            })
            .collect();
        out.sort_by(|a, b| a.post_url.cmp(&b.post_url));
        Ok(out)
    }

    async fn record_cycle(&self, record: &CycleRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.cycles.iter().any(|c| c.cycle_id == record.cycle_id) {
            state.cycles.push(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use leadscout_common::{EngagementType, NewEngager};

    use super::*;

    fn engager(url: &str, kind: EngagementType) -> NewEngager {
        NewEngager {
            profile_url: url.to_string(),
            name: Some("Ada Lovelace".into()),
            headline: None,
            engagement_type: kind,
        }
    }

    async fn ledger_with(url: &str) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger
            .upsert_posts(&[PostSeed {
                post_url: url.into(),
                post_name: Some("Launch".into()),
            }])
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn upsert_renames_without_duplicating() {
        let ledger = ledger_with("https://www.linkedin.com/posts/a").await;
        let stats = ledger
            .upsert_posts(&[
                PostSeed {
                    post_url: " https://www.linkedin.com/posts/a ".into(),
                    post_name: Some("Launch v2".into()),
                },
                PostSeed {
                    post_url: "  ".into(),
                    post_name: None,
                },
            ])
            .await
            .unwrap();

        assert_eq!(stats.renamed, 1);
        assert_eq!(stats.rejected, 1);
        let posts = ledger.posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post_name.as_deref(), Some("Launch v2"));
    }

    #[tokio::test]
    async fn first_sighting_wins_across_scrapes() {
        let url = "https://www.linkedin.com/posts/a";
        let ledger = ledger_with(url).await;
        let t0 = Utc::now();
        let profile = "https://www.linkedin.com/in/ada";

        let first = ledger
            .commit_scrape(ScrapeCommit::success(url, t0, 3, 0.1, vec![engager(profile, EngagementType::Reaction)]))
            .await
            .unwrap();
        let second = ledger
            .commit_scrape(ScrapeCommit::success(
                url,
                t0 + Duration::days(3),
                4,
                0.1,
                vec![engager(profile, EngagementType::Comment)],
            ))
            .await
            .unwrap();

        assert_eq!(first.engagers_inserted, 1);
        assert_eq!(second.engagers_inserted, 0);
        assert_eq!(second.engagers_existing, 1);
        let rows = ledger.engagers_for_post(url).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].engagement_type, EngagementType::Reaction);
        assert_eq!(rows[0].scrape_id, first.scrape_id);
    }

    #[tokio::test]
    async fn failure_keeps_reactions_and_never_rewinds_timestamp() {
        let url = "https://www.linkedin.com/posts/a";
        let ledger = ledger_with(url).await;
        let t0 = Utc::now();

        ledger
            .commit_scrape(ScrapeCommit::success(url, t0, 12, 0.2, vec![]))
            .await
            .unwrap();
        ledger
            .commit_scrape(ScrapeCommit::failure(
                url,
                t0 - Duration::hours(1),
                ScrapeStatus::FailedTransient,
                0.0,
                "timed out",
            ))
            .await
            .unwrap();

        let post = ledger.post(url).await.unwrap().unwrap();
        assert_eq!(post.scrape_count, 2);
        assert_eq!(post.total_reactions, 12);
        assert_eq!(post.last_scraped_at, Some(t0));
        assert!(ledger.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_count_refuses_commit() {
        let url = "https://www.linkedin.com/posts/a";
        let ledger = ledger_with(url).await;
        ledger.corrupt_scrape_count(url, 3);

        let err = ledger
            .commit_scrape(ScrapeCommit::success(url, Utc::now(), 1, 0.0, vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, LeadScoutError::StateInconsistency { event_count: 0, .. }));
        assert!(ledger.scrape_events(url).await.unwrap().is_empty());
        assert_eq!(ledger.audit().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_forwarded_only_flips_once() {
        let url = "https://www.linkedin.com/posts/a";
        let ledger = ledger_with(url).await;
        ledger
            .commit_scrape(ScrapeCommit::success(
                url,
                Utc::now(),
                1,
                0.0,
                vec![engager("https://www.linkedin.com/in/ada", EngagementType::Reaction)],
            ))
            .await
            .unwrap();
        let id = ledger.all_engagers()[0].id;

        assert_eq!(ledger.mark_forwarded(&[id], Utc::now()).await.unwrap(), vec![id]);
        assert!(ledger.mark_forwarded(&[id], Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enrichment_never_blanks_earlier_values() {
        let url = "https://www.linkedin.com/posts/a";
        let ada = "https://www.linkedin.com/in/ada";
        let ledger = ledger_with(url).await;
        ledger
            .commit_scrape(ScrapeCommit::success(url, Utc::now(), 1, 0.0, vec![engager(ada, EngagementType::Reaction)]))
            .await
            .unwrap();
        let full = ProfileEnrichment {
            company: Some("Acme".into()),
            title: Some("CTO".into()),
            audience: Some("founders".into()),
        };
        ledger.record_enrichment(ada, &full, Utc::now()).await.unwrap();

        let partial = ProfileEnrichment {
            company: Some(" Acme Robotics ".into()),
            title: Some("   ".into()),
            audience: None,
        };
        assert_eq!(ledger.record_enrichment(ada, &partial, Utc::now()).await.unwrap(), 1);
        assert_eq!(
            ledger.record_enrichment(ada, &ProfileEnrichment::default(), Utc::now()).await.unwrap(),
            0
        );

        let row = &ledger.all_engagers()[0];
        assert_eq!(row.company.as_deref(), Some("Acme Robotics"));
        assert_eq!(row.title.as_deref(), Some("CTO"));
        assert_eq!(row.audience.as_deref(), Some("founders"));
    }

    #[tokio::test]
    async fn post_media_is_written_once() {
        let url = "https://www.linkedin.com/posts/a";
        let ledger = ledger_with(url).await;
        assert_eq!(ledger.posts_needing_media(10).await.unwrap(), vec![url.to_string()]);
        assert!(ledger.post_media(url).await.unwrap().is_none());

        let video = PostMedia {
            media_type: Some("video".into()),
            duration: Some(42.5),
            video_url: Some("https://dms.licdn.com/v.mp4".into()),
            ..PostMedia::default()
        };
        assert!(ledger.record_post_media(url, &video, Utc::now()).await.unwrap());
        assert!(!ledger
            .record_post_media(url, &PostMedia::default(), Utc::now())
            .await
            .unwrap());

        assert_eq!(ledger.post_media(url).await.unwrap(), Some(video));
        assert!(ledger.posts_needing_media(10).await.unwrap().is_empty());
        let post = ledger.post(url).await.unwrap().unwrap();
        assert!(post.enriched);
        assert!(post.enriched_at.is_some());
    }
}
