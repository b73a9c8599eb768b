use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// --- LinkedIn post reactions actor ---

/// Input for the LinkedIn post reactions actor. One run fetches one page.
#[derive(Debug, Clone, Serialize)]
pub struct PostReactionsInput {
    pub post_url: String,
    pub page_number: u32,
    /// `ALL` or a single reaction kind such as `LIKE`.
    pub reaction_type: String,
    pub limit: u32,
}

/// A single reaction row from the reactions actor dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionItem {
    /// LinkedIn reaction kind: LIKE, PRAISE, EMPATHY, INTEREST, APPRECIATION, ENTERTAINMENT.
    pub reaction_type: Option<String>,
    pub reactor: Reactor,
    #[serde(rename = "_metadata")]
    pub metadata: Option<ReactionMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reactor {
    pub urn: Option<String>,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionMetadata {
    pub post_url: Option<String>,
    pub page_number: Option<u32>,
    /// The actor sometimes reports this as a zero-padded string.
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_reactions: Option<i64>,
}

/// One page of reactions plus what the run cost.
#[derive(Debug, Clone)]
pub struct ReactionsPage {
    pub page_number: u32,
    pub items: Vec<ReactionItem>,
    pub cost_usd: f64,
}

impl ReactionsPage {
    /// The aggregate reaction count reported alongside the items, if any.
    pub fn total_reactions(&self) -> Option<i64> {
        self.items
            .iter()
            .find_map(|item| item.metadata.as_ref().and_then(|m| m.total_reactions))
    }
}

// --- LinkedIn profile actor ---

/// Input for the LinkedIn profile actor.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileScraperInput {
    pub username: String,
}

/// A LinkedIn profile from the profile actor dataset. Only the fields needed
/// for lead qualification are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInProfile {
    pub basic_info: Option<BasicInfo>,
    #[serde(default)]
    pub experience: Vec<Experience>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicInfo {
    pub fullname: Option<String>,
    pub headline: Option<String>,
    pub current_company: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Experience {
    pub title: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub is_current: bool,
}

impl LinkedInProfile {
    /// Current company and most recent job title.
    ///
    /// The company comes from `basic_info.current_company` when present,
    /// otherwise from the chosen experience entry. The title comes from the
    /// first entry flagged current, falling back to the first entry listed.
    pub fn current_position(&self) -> (Option<String>, Option<String>) {
        let company = self
            .basic_info
            .as_ref()
            .and_then(|b| non_blank(b.current_company.as_deref()));

        let job = self
            .experience
            .iter()
            .find(|e| e.is_current)
            .or_else(|| self.experience.first());

        let title = job.and_then(|j| non_blank(j.title.as_deref()));
        let company = company.or_else(|| job.and_then(|j| non_blank(j.company.as_deref())));
        (company, title)
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

// --- LinkedIn post media actor ---

/// Input for the LinkedIn post detail actor.
#[derive(Debug, Clone, Serialize)]
pub struct PostMediaInput {
    pub post_url: String,
}

/// One post from the post detail actor dataset. Only the attached media is modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct PostDetailItem {
    #[serde(default)]
    pub post: Option<PostRef>,
    /// Text-only posts report `null` or an empty list.
    #[serde(default, deserialize_with = "lenient_list")]
    pub media: Vec<MediaEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostRef {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaEntry {
    /// `video`, `image`, `document`, ...
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration: Option<f64>,
    pub mime_type: Option<String>,
    pub thumbnail: Option<String>,
    pub video_url: Option<String>,
    /// Image location. Only meaningful when `kind` is `image`.
    pub url: Option<String>,
}

impl PostDetailItem {
    /// The first attached media item, which is the only one kept.
    pub fn first_media(&self) -> Option<&MediaEntry> {
        self.media.first()
    }
}

impl MediaEntry {
    pub fn is_video(&self) -> bool {
        self.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("video"))
    }

    pub fn is_image(&self) -> bool {
        self.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("image"))
    }
}

/// Accept a list, skipping entries that don't parse. Anything else reads as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

// --- Platform envelope ---

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Platform usage billed for this run, in USD.
    #[serde(rename = "usageTotalUsd")]
    pub usage_total_usd: Option<f64>,
}
