use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LeadScoutError;
use crate::urls::is_person_profile_url;

// --- Posts ---

/// A tracked LinkedIn post. Identity is `post_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub post_url: String,
    pub post_name: Option<String>,
    /// When the latest attempt ran, successful or not. Never moves backwards.
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// Attempts so far. Always equals the number of scrape events for this post.
    pub scrape_count: i32,
    /// Latest observed reaction total (a gauge, replaced on every successful scrape).
    pub total_reactions: i32,
    pub enriched: bool,
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The first attached media item of a post, as the media lookup reports it.
///
/// All fields empty means the post has no media (a text-only post).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMedia {
    /// `video`, `image`, `document`, ... as the provider labels it.
    pub media_type: Option<String>,
    /// Seconds. Videos only.
    pub duration: Option<f64>,
    pub mime_type: Option<String>,
    pub thumbnail: Option<String>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
}

impl PostMedia {
    pub fn is_empty(&self) -> bool {
        !has_text(&self.media_type)
    }
}

/// A post as the source of truth lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSeed {
    pub post_url: String,
    #[serde(default)]
    pub post_name: Option<String>,
}

// --- Scrape events ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    /// Network, timeout or rate limit.
    FailedTransient,
    /// Malformed response, auth failure, crashed actor.
    FailedPermanent,
    /// Not sent to the provider (unrecognizable post URL). Still an attempt.
    Skipped,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Success => "success",
            ScrapeStatus::FailedTransient => "failed_transient",
            ScrapeStatus::FailedPermanent => "failed_permanent",
            ScrapeStatus::Skipped => "skipped",
        }
    }

    /// Parse a stored status. Unknown values (older rows wrote `failure`) read as permanent failures.
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => ScrapeStatus::Success,
            "failed_transient" => ScrapeStatus::FailedTransient,
            "skipped" => ScrapeStatus::Skipped,
            _ => ScrapeStatus::FailedPermanent,
        }
    }

    pub fn for_error(err: &LeadScoutError) -> Self {
        if err.is_transient() {
            ScrapeStatus::FailedTransient
        } else {
            ScrapeStatus::FailedPermanent
        }
    }
}

impl std::fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed scrape attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeEvent {
    pub id: i64,
    pub post_url: String,
    pub ran_at: DateTime<Utc>,
    pub reactions_count: Option<i32>,
    pub cost_usd: f64,
    pub status: ScrapeStatus,
    pub error: Option<String>,
}

// --- Engagement ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementType {
    Reaction,
    Comment,
    Repost,
}

impl EngagementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementType::Reaction => "reaction",
            EngagementType::Comment => "comment",
            EngagementType::Repost => "repost",
        }
    }

    /// Map a provider label onto an engagement type. Reaction kinds
    /// (LIKE, PRAISE, EMPATHY, ...) all collapse to `Reaction`.
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "comment" | "comments" => EngagementType::Comment,
            "repost" | "reposts" | "share" | "reshare" => EngagementType::Repost,
            _ => EngagementType::Reaction,
        }
    }
}

impl std::fmt::Display for EngagementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw engagement record as the scrape capability reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementRecord {
    pub profile_url: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub engagement_type: EngagementType,
}

/// What a successful scrape returned.
#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    pub records: Vec<EngagementRecord>,
    pub total_reactions: Option<i64>,
    pub cost_usd: f64,
}

/// A failed scrape. Carries whatever the provider billed before failing.
#[derive(Debug)]
pub struct ScrapeFailure {
    pub error: LeadScoutError,
    pub cost_usd: f64,
}

impl From<LeadScoutError> for ScrapeFailure {
    fn from(error: LeadScoutError) -> Self {
        Self {
            error,
            cost_usd: 0.0,
        }
    }
}

/// An engager row ready to insert. Produced by the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEngager {
    pub profile_url: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub engagement_type: EngagementType,
}

/// A person who engaged with a post. Unique per (profile_url, post_url).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engager {
    pub id: i64,
    /// The scrape event that first observed this engagement.
    pub scrape_id: i64,
    pub post_url: String,
    pub profile_url: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub engagement_type: EngagementType,
    pub company: Option<String>,
    pub title: Option<String>,
    pub audience: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub pushed_to_crm: bool,
    pub pushed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Engager {
    /// Fully enriched and pointing at a person (not a company page).
    pub fn is_qualified(&self) -> bool {
        has_text(&self.company) && has_text(&self.title) && is_person_profile_url(&self.profile_url)
    }
}

/// Result of profile enrichment. Each field that carries text replaces the
/// stored value; a missing or blank field leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEnrichment {
    pub company: Option<String>,
    pub title: Option<String>,
    pub audience: Option<String>,
}

impl ProfileEnrichment {
    pub fn is_empty(&self) -> bool {
        !has_text(&self.company) && !has_text(&self.title) && !has_text(&self.audience)
    }

    /// Trimmed copy with blank fields turned into `None`.
    pub fn cleaned(&self) -> Self {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            company: clean(&self.company),
            title: clean(&self.title),
            audience: clean(&self.audience),
        }
    }
}

/// An unforwarded, qualified engager joined with its post's display name.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadCandidate {
    pub engager_id: i64,
    pub post_url: String,
    pub post_name: Option<String>,
    pub profile_url: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub audience: Option<String>,
}

/// What the CRM did with a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Created,
    /// The CRM's own dedup matched an existing contact.
    Duplicate,
}

pub fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_kinds_collapse_to_reaction() {
        for label in ["LIKE", "PRAISE", "EMPATHY", "interest", ""] {
            assert_eq!(EngagementType::from_str_loose(label), EngagementType::Reaction);
        }
        assert_eq!(EngagementType::from_str_loose("COMMENT"), EngagementType::Comment);
        assert_eq!(EngagementType::from_str_loose("Repost"), EngagementType::Repost);
    }

    #[test]
    fn unknown_status_reads_as_permanent_failure() {
        assert_eq!(ScrapeStatus::from_str_loose("success"), ScrapeStatus::Success);
        assert_eq!(ScrapeStatus::from_str_loose("failure"), ScrapeStatus::FailedPermanent);
        assert_eq!(
            ScrapeStatus::from_str_loose(ScrapeStatus::FailedTransient.as_str()),
            ScrapeStatus::FailedTransient
        );
    }

    #[test]
    fn status_follows_error_class() {
        let transient = LeadScoutError::TransientExternal("429".into());
        let permanent = LeadScoutError::PermanentExternal("401".into());
        assert_eq!(ScrapeStatus::for_error(&transient), ScrapeStatus::FailedTransient);
        assert_eq!(ScrapeStatus::for_error(&permanent), ScrapeStatus::FailedPermanent);
    }
}
