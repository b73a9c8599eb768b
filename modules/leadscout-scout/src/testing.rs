// Test mocks for the cycle.
//
// One mock per capability boundary plus a notifier that remembers:
// - MockScraper (EngagementScraper): post URL -> canned result, tracks concurrency
// - MockEnricher (ProfileEnricher): profile URL -> canned enrichment
// - MockMediaScraper (PostMediaScraper): post URL -> canned media
// - MockCrm (CrmPusher): profile URL -> canned outcome, optional push hook
// - RecordingNotifier (NotifyBackend)
//
// Plus helpers for constructing posts and engagement records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadscout_common::{
    EngagementRecord, EngagementType, LeadCandidate, LeadScoutError, Post, PostMedia,
    ProfileEnrichment, PushOutcome, Result, ScrapeFailure, ScrapeResult,
};

use crate::notify::{Alert, NotifyBackend};
use crate::pipeline::stats::CycleStats;
use crate::traits::{CrmPusher, EngagementScraper, PostMediaScraper, ProfileEnricher};

/// Errors are not `Clone`; rebuild an equivalent one on every call.
fn replay(err: &LeadScoutError) -> LeadScoutError {
    match err {
        LeadScoutError::TransientExternal(m) => LeadScoutError::TransientExternal(m.clone()),
        LeadScoutError::PermanentExternal(m) => LeadScoutError::PermanentExternal(m.clone()),
        other => LeadScoutError::PermanentExternal(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn reaction(profile_url: &str, engagement_type: EngagementType) -> EngagementRecord {
    EngagementRecord {
        profile_url: profile_url.to_string(),
        name: Some("Test Person".into()),
        headline: Some("Builds things".into()),
        engagement_type,
    }
}

/// A post as it would come back from the ledger.
pub fn post_fixture(
    id: i64,
    post_url: &str,
    scrape_count: i32,
    total_reactions: i32,
    last_scraped_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> Post {
    Post {
        id,
        post_url: post_url.to_string(),
        post_name: None,
        last_scraped_at,
        scrape_count,
        total_reactions,
        enriched: false,
        enriched_at: None,
        created_at,
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

enum ScrapeResponse {
    Ok(ScrapeResult),
    Err { error: LeadScoutError, cost_usd: f64 },
}

/// HashMap-based scraper. Unregistered URLs fail permanently.
/// Builder pattern: `.on_post()`, `.on_failure()`, `.with_delay()`.
pub struct MockScraper {
    responses: HashMap<String, ScrapeResponse>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScraper {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn on_post(self, post_url: &str, records: Vec<EngagementRecord>, total_reactions: Option<i64>) -> Self {
        self.on_post_with_cost(post_url, records, total_reactions, 0.0)
    }

    pub fn on_post_with_cost(
        mut self,
        post_url: &str,
        records: Vec<EngagementRecord>,
        total_reactions: Option<i64>,
        cost_usd: f64,
    ) -> Self {
        self.responses.insert(
            post_url.to_string(),
            ScrapeResponse::Ok(ScrapeResult {
                records,
                total_reactions,
                cost_usd,
            }),
        );
        self
    }

    pub fn on_failure(mut self, post_url: &str, error: LeadScoutError, cost_usd: f64) -> Self {
        self.responses
            .insert(post_url.to_string(), ScrapeResponse::Err { error, cost_usd });
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of scrapes observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngagementScraper for MockScraper {
    async fn scrape(&self, post_url: &str) -> std::result::Result<ScrapeResult, ScrapeFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Decrements on completion or when a timeout drops us.
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.responses.get(post_url) {
            Some(ScrapeResponse::Ok(result)) => Ok(result.clone()),
            Some(ScrapeResponse::Err { error, cost_usd }) => Err(ScrapeFailure {
                error: replay(error),
                cost_usd: *cost_usd,
            }),
            None => Err(ScrapeFailure::from(LeadScoutError::PermanentExternal(format!(
                "MockScraper: no response registered for {post_url}"
            )))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockEnricher
// ---------------------------------------------------------------------------

/// Returns the registered enrichment, or an empty one for unknown profiles.
pub struct MockEnricher {
    profiles: HashMap<String, ProfileEnrichment>,
    failures: HashMap<String, LeadScoutError>,
    calls: Mutex<Vec<String>>,
}

impl Default for MockEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnricher {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_profile(mut self, profile_url: &str, enrichment: ProfileEnrichment) -> Self {
        self.profiles.insert(profile_url.to_string(), enrichment);
        self
    }

    pub fn on_failure(mut self, profile_url: &str, error: LeadScoutError) -> Self {
        self.failures.insert(profile_url.to_string(), error);
        self
    }

    /// Profiles asked about, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileEnricher for MockEnricher {
    async fn enrich(&self, profile_url: &str) -> Result<ProfileEnrichment> {
        self.calls.lock().unwrap().push(profile_url.to_string());
        if let Some(err) = self.failures.get(profile_url) {
            return Err(replay(err));
        }
        Ok(self.profiles.get(profile_url).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockMediaScraper
// ---------------------------------------------------------------------------

/// Returns the registered media, or none for unknown posts.
#[derive(Default)]
pub struct MockMediaScraper {
    media: HashMap<String, PostMedia>,
    failures: HashMap<String, LeadScoutError>,
    calls: Mutex<Vec<String>>,
}

impl MockMediaScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_post(mut self, post_url: &str, media: PostMedia) -> Self {
        self.media.insert(post_url.to_string(), media);
        self
    }

    pub fn on_failure(mut self, post_url: &str, error: LeadScoutError) -> Self {
        self.failures.insert(post_url.to_string(), error);
        self
    }

    /// Posts asked about, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostMediaScraper for MockMediaScraper {
    async fn media(&self, post_url: &str) -> Result<PostMedia> {
        self.calls.lock().unwrap().push(post_url.to_string());
        if let Some(err) = self.failures.get(post_url) {
            return Err(replay(err));
        }
        Ok(self.media.get(post_url).cloned().unwrap_or_default())
    }
}

/// A video attachment, as the media lookup reports one.
pub fn video(duration: f64) -> PostMedia {
    PostMedia {
        media_type: Some("video".into()),
        duration: Some(duration),
        mime_type: Some("video/mp4".into()),
        video_url: Some("https://dms.licdn.com/playlist/vid.mp4".into()),
        ..PostMedia::default()
    }
}

// ---------------------------------------------------------------------------
// MockCrm
// ---------------------------------------------------------------------------

type PushHook = Box<dyn Fn(&LeadCandidate) + Send + Sync>;

/// Creates every contact unless told otherwise.
pub struct MockCrm {
    duplicates: Vec<String>,
    failures: HashMap<String, LeadScoutError>,
    hook: Option<PushHook>,
    pushed: Mutex<Vec<String>>,
}

impl Default for MockCrm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCrm {
    pub fn new() -> Self {
        Self {
            duplicates: Vec::new(),
            failures: HashMap::new(),
            hook: None,
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Report this profile as already present in the CRM.
    pub fn duplicate(mut self, profile_url: &str) -> Self {
        self.duplicates.push(profile_url.to_string());
        self
    }

    pub fn failing(mut self, profile_url: &str, error: LeadScoutError) -> Self {
        self.failures.insert(profile_url.to_string(), error);
        self
    }

    /// Run `hook` during every push, before the outcome is returned.
    pub fn on_push(mut self, hook: impl Fn(&LeadCandidate) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Profiles pushed, in call order.
    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrmPusher for MockCrm {
    async fn push(&self, lead: &LeadCandidate) -> Result<PushOutcome> {
        self.pushed.lock().unwrap().push(lead.profile_url.clone());
        if let Some(hook) = &self.hook {
            hook(lead);
        }
        if let Some(err) = self.failures.get(&lead.profile_url) {
            return Err(replay(err));
        }
        if self.duplicates.contains(&lead.profile_url) {
            return Ok(PushOutcome::Duplicate);
        }
        Ok(PushOutcome::Created)
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
    digests: AtomicUsize,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn digests(&self) -> usize {
        self.digests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn send_digest(&self, _stats: &CycleStats) -> anyhow::Result<()> {
        self.digests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
