use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use leadscout_common::{Post, SchedulerConfig};

/// Decides which posts to scrape this cycle, and in what order.
///
/// Pure: the same snapshot and `now` always give the same answer.
pub struct PostScheduler {
    config: SchedulerConfig,
}

/// Result of scheduling: which posts to scrape and why the rest were left out.
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    /// At most `batch_size` posts, in scrape order.
    pub scheduled: Vec<ScheduledPost>,
    /// Eligible but cut by the batch size. Picked up by a later cycle.
    pub deferred: usize,
    pub skipped: SkipCounts,
}

impl ScheduleResult {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPost {
    pub post_id: i64,
    pub post_url: String,
    pub reason: ScheduleReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleReason {
    /// Never been scraped.
    NeverScraped,
    /// Cooldown elapsed and attempts remain.
    Stale,
}

/// Why excluded posts were excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    /// Out of attempts. Never selected again.
    pub exhausted: usize,
    /// Scraped too recently.
    pub cooling_down: usize,
    /// Repeatedly scraped with zero reactions. Never selected again.
    pub diminishing_returns: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.exhausted + self.cooling_down + self.diminishing_returns
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible(ScheduleReason),
    Exhausted,
    CoolingDown,
    DiminishingReturns,
}

impl PostScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Classify one post against the eligibility rules.
    pub fn eligibility(&self, post: &Post, now: DateTime<Utc>) -> Eligibility {
        let last = match post.last_scraped_at {
            Some(t) => t,
            None => return Eligibility::Eligible(ScheduleReason::NeverScraped),
        };

        if post.scrape_count >= self.config.max_attempts {
            return Eligibility::Exhausted;
        }
        if post.total_reactions == 0 && post.scrape_count >= self.config.diminishing_returns_threshold {
            return Eligibility::DiminishingReturns;
        }
        if now - last < self.config.cooldown {
            return Eligibility::CoolingDown;
        }
        Eligibility::Eligible(ScheduleReason::Stale)
    }

    /// Pick this cycle's posts: never-scraped newest first, then the stalest
    /// of the rest, truncated to the batch size.
    pub fn schedule(&self, posts: &[Post], now: DateTime<Utc>) -> ScheduleResult {
        let mut never_scraped: Vec<&Post> = Vec::new();
        let mut stale: Vec<&Post> = Vec::new();
        let mut skipped = SkipCounts::default();

        for post in posts {
            match self.eligibility(post, now) {
                Eligibility::Eligible(ScheduleReason::NeverScraped) => never_scraped.push(post),
                Eligibility::Eligible(ScheduleReason::Stale) => stale.push(post),
                Eligibility::Exhausted => skipped.exhausted += 1,
                Eligibility::CoolingDown => skipped.cooling_down += 1,
                Eligibility::DiminishingReturns => skipped.diminishing_returns += 1,
            }
        }

        never_scraped.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        stale.sort_by(|a, b| a.last_scraped_at.cmp(&b.last_scraped_at).then(a.id.cmp(&b.id)));

        let eligible = never_scraped.len() + stale.len();
        let scheduled: Vec<ScheduledPost> = never_scraped
            .into_iter()
            .map(|p| (p, ScheduleReason::NeverScraped))
            .chain(stale.into_iter().map(|p| (p, ScheduleReason::Stale)))
            .take(self.config.batch_size)
            .map(|(p, reason)| ScheduledPost {
                post_id: p.id,
                post_url: p.post_url.clone(),
                reason,
            })
            .collect();

        let deferred = eligible - scheduled.len();
        info!(
            scheduled = scheduled.len(),
            deferred,
            exhausted = skipped.exhausted,
            cooling_down = skipped.cooling_down,
            diminishing_returns = skipped.diminishing_returns,
            "Post scheduling complete"
        );

        ScheduleResult {
            scheduled,
            deferred,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn post(id: i64, scrape_count: i32, total_reactions: i32, last: Option<DateTime<Utc>>) -> Post {
        let created = Utc::now() - Duration::days(30) + Duration::minutes(id);
        Post {
            id,
            post_url: format!("https://www.linkedin.com/posts/p-{id}"),
            post_name: None,
            last_scraped_at: last,
            scrape_count,
            total_reactions,
            enriched: false,
            enriched_at: None,
            created_at: created,
        }
    }

    fn scheduler(batch_size: usize) -> PostScheduler {
        PostScheduler::new(SchedulerConfig {
            batch_size,
            ..SchedulerConfig::default()
        })
    }

    fn ids(result: &ScheduleResult) -> Vec<i64> {
        result.scheduled.iter().map(|s| s.post_id).collect()
    }

    #[test]
    fn never_scraped_beats_stale() {
        let now = Utc::now();
        let a = post(1, 0, 0, None);
        let b = post(2, 4, 10, Some(now - Duration::days(3)));

        let result = scheduler(1).schedule(&[b, a], now);

        assert_eq!(ids(&result), vec![1]);
        assert_eq!(result.scheduled[0].reason, ScheduleReason::NeverScraped);
        assert_eq!(result.deferred, 1);
    }

    #[test]
    fn zero_reactions_after_two_attempts_is_excluded() {
        let now = Utc::now();
        let c = post(3, 2, 0, Some(now - Duration::days(5)));

        let result = scheduler(5).schedule(&[c.clone()], now);

        assert!(result.is_empty());
        assert_eq!(result.skipped.diminishing_returns, 1);
        // And stays excluded no matter how long it waits.
        let much_later = now + Duration::days(365);
        assert_eq!(
            scheduler(5).eligibility(&c, much_later),
            Eligibility::DiminishingReturns
        );
    }

    #[test]
    fn one_zero_reaction_attempt_still_gets_a_retry() {
        let now = Utc::now();
        let p = post(4, 1, 0, Some(now - Duration::days(3)));
        assert_eq!(
            scheduler(5).eligibility(&p, now),
            Eligibility::Eligible(ScheduleReason::Stale)
        );
    }

    #[test]
    fn exhausted_posts_are_never_selected() {
        let now = Utc::now();
        let p = post(5, 5, 120, Some(now - Duration::days(90)));
        let result = scheduler(5).schedule(&[p], now);
        assert!(result.is_empty());
        assert_eq!(result.skipped.exhausted, 1);
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let now = Utc::now();
        let exactly = post(6, 1, 3, Some(now - Duration::days(2)));
        let almost = post(7, 1, 3, Some(now - Duration::days(2) + Duration::seconds(1)));

        let result = scheduler(5).schedule(&[exactly, almost], now);

        assert_eq!(ids(&result), vec![6]);
        assert_eq!(result.skipped.cooling_down, 1);
    }

    #[test]
    fn ordering_is_newest_unscraped_then_stalest() {
        let now = Utc::now();
        let posts = vec![
            post(1, 0, 0, None),
            post(2, 0, 0, None),
            post(3, 1, 9, Some(now - Duration::days(4))),
            post(4, 1, 9, Some(now - Duration::days(10))),
            post(5, 1, 9, Some(now - Duration::days(4))),
        ];

        let result = scheduler(10).schedule(&posts, now);

        // 2 was created after 1; 4 is stalest; 3 and 5 tie on staleness, lower id first.
        assert_eq!(ids(&result), vec![2, 1, 4, 3, 5]);
    }

    #[test]
    fn creation_ties_break_on_id_descending() {
        let now = Utc::now();
        let mut a = post(10, 0, 0, None);
        let mut b = post(11, 0, 0, None);
        a.created_at = now;
        b.created_at = now;

        let result = scheduler(5).schedule(&[a, b], now);
        assert_eq!(ids(&result), vec![11, 10]);
    }

    #[test]
    fn selection_is_deterministic() {
        let now = Utc::now();
        let posts: Vec<Post> = (1..=12)
            .map(|i| post(i, (i % 4) as i32, (i % 3) as i32, Some(now - Duration::days(i))))
            .collect();

        let s = scheduler(5);
        assert_eq!(ids(&s.schedule(&posts, now)), ids(&s.schedule(&posts, now)));
    }

    #[test]
    fn empty_snapshot_is_nothing_to_do() {
        let result = scheduler(5).schedule(&[], Utc::now());
        assert!(result.is_empty());
        assert_eq!(result.skipped.total(), 0);
    }
}
