// Capability boundaries for the cycle.
//
// The scrape provider, the enrichers and the CRM are all reached
// through these traits. Production impls live in `infra`; the mocks in
// `testing` stand in for them so the whole cycle runs without network.

use async_trait::async_trait;

use leadscout_common::{
    LeadCandidate, PostMedia, ProfileEnrichment, PushOutcome, Result, ScrapeFailure, ScrapeResult,
};

/// Fetches the engagement on one post.
#[async_trait]
pub trait EngagementScraper: Send + Sync {
    /// Scrape everyone who engaged with `post_url`.
    ///
    /// A failure still reports whatever the provider billed before it failed.
    async fn scrape(&self, post_url: &str) -> std::result::Result<ScrapeResult, ScrapeFailure>;
}

/// Looks up what media a post carries. Empty media means a text-only post.
#[async_trait]
pub trait PostMediaScraper: Send + Sync {
    async fn media(&self, post_url: &str) -> Result<PostMedia>;
}

/// Looks up a person's current company, title and audience.
#[async_trait]
pub trait ProfileEnricher: Send + Sync {
    async fn enrich(&self, profile_url: &str) -> Result<ProfileEnrichment>;
}

/// Forwards a qualified lead to the CRM.
#[async_trait]
pub trait CrmPusher: Send + Sync {
    /// Push one person. `Duplicate` means the CRM already had them, which
    /// counts as forwarded.
    async fn push(&self, lead: &LeadCandidate) -> Result<PushOutcome>;
}
