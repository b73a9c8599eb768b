use apify_client::{ApifyClient, ApifyError, MediaEntry, ReactionItem, REACTIONS_PAGE_SIZE};
use async_trait::async_trait;
use tracing::info;

use leadscout_common::{
    EngagementRecord, EngagementType, LeadScoutError, PostMedia, ProfileEnrichment, Result,
    ScrapeFailure, ScrapeResult,
};

use crate::traits::{EngagementScraper, PostMediaScraper, ProfileEnricher};

pub fn classify(err: ApifyError) -> LeadScoutError {
    if err.is_transient() {
        LeadScoutError::TransientExternal(err.to_string())
    } else {
        LeadScoutError::PermanentExternal(err.to_string())
    }
}

fn to_record(item: ReactionItem) -> EngagementRecord {
    EngagementRecord {
        profile_url: item.reactor.profile_url.unwrap_or_default(),
        name: item.reactor.name,
        headline: item.reactor.headline,
        engagement_type: EngagementType::from_str_loose(item.reaction_type.as_deref().unwrap_or("")),
    }
}

/// Post reactions via the Apify LinkedIn reactions actor.
pub struct ApifyScraper {
    client: ApifyClient,
    max_pages: u32,
}

impl ApifyScraper {
    pub fn new(client: ApifyClient, max_pages: u32) -> Self {
        Self { client, max_pages }
    }
}

#[async_trait]
impl EngagementScraper for ApifyScraper {
    /// Pages through the reactions one actor run at a time so that a failure
    /// half way still reports what the earlier pages cost.
    async fn scrape(&self, post_url: &str) -> std::result::Result<ScrapeResult, ScrapeFailure> {
        let mut out = ScrapeResult::default();

        for page_number in 1..=self.max_pages.max(1) {
            let page = match self.client.fetch_reactions_page(post_url, page_number).await {
                Ok(page) => page,
                Err(e) => {
                    return Err(ScrapeFailure {
                        error: classify(e),
                        cost_usd: out.cost_usd,
                    })
                }
            };

            out.cost_usd += page.cost_usd;
            if out.total_reactions.is_none() {
                out.total_reactions = page.total_reactions();
            }
            let count = page.items.len() as u32;
            out.records.extend(page.items.into_iter().map(to_record));
            if count < REACTIONS_PAGE_SIZE {
                break;
            }
        }

        info!(
            post_url,
            records = out.records.len(),
            total_reactions = ?out.total_reactions,
            cost_usd = out.cost_usd,
            "Reactions scraped"
        );
        Ok(out)
    }
}

/// Video fields only count for videos, the image URL only for images.
fn to_media(entry: &MediaEntry) -> PostMedia {
    let video = entry.is_video();
    let pick = |keep: bool, v: &Option<String>| if keep { v.clone() } else { None };
    PostMedia {
        media_type: entry.kind.clone(),
        duration: entry.duration.filter(|_| video),
        mime_type: pick(video, &entry.mime_type),
        thumbnail: pick(video, &entry.thumbnail),
        video_url: pick(video, &entry.video_url),
        image_url: pick(entry.is_image(), &entry.url),
    }
}

/// Post media via the Apify LinkedIn post detail actor.
pub struct ApifyPostMedia {
    client: ApifyClient,
}

impl ApifyPostMedia {
    pub fn new(client: ApifyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PostMediaScraper for ApifyPostMedia {
    async fn media(&self, post_url: &str) -> Result<PostMedia> {
        let output = self.client.scrape_post_detail(post_url).await.map_err(classify)?;
        Ok(output
            .items
            .first()
            .and_then(|item| item.first_media())
            .map(to_media)
            .unwrap_or_default())
    }
}

/// Current company and title via the Apify LinkedIn profile actor.
///
/// The actor knows nothing about audience, so that field stays empty.
pub struct ApifyEnricher {
    client: ApifyClient,
}

impl ApifyEnricher {
    pub fn new(client: ApifyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProfileEnricher for ApifyEnricher {
    async fn enrich(&self, profile_url: &str) -> Result<ProfileEnrichment> {
        let output = self.client.scrape_profile(profile_url).await.map_err(classify)?;
        let Some(profile) = output.items.first() else {
            return Ok(ProfileEnrichment::default());
        };
        let (company, title) = profile.current_position();
        Ok(ProfileEnrichment {
            company,
            title,
            audience: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(json: serde_json::Value) -> ReactionItem {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn reaction_items_become_engagement_records() {
        let record = to_record(item(serde_json::json!({
            "reaction_type": "PRAISE",
            "reactor": {
                "name": "Ada Lovelace",
                "headline": "Analyst",
                "profile_url": "https://www.linkedin.com/in/ACoAAB1"
            }
        })));

        assert_eq!(record.engagement_type, EngagementType::Reaction);
        assert_eq!(record.profile_url, "https://www.linkedin.com/in/ACoAAB1");
        assert_eq!(record.name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn missing_profile_url_becomes_blank() {
        let record = to_record(item(serde_json::json!({ "reactor": { "name": "Private" } })));
        assert_eq!(record.profile_url, "");
    }

    #[test]
    fn media_fields_follow_the_media_kind() {
        let video: MediaEntry = serde_json::from_value(serde_json::json!({
            "type": "video",
            "duration": 12.0,
            "mime_type": "video/mp4",
            "video_url": "https://media.example/v.mp4",
            "url": "https://media.example/ignored.jpg"
        }))
        .unwrap();
        let media = to_media(&video);
        assert_eq!(media.media_type.as_deref(), Some("video"));
        assert_eq!(media.duration, Some(12.0));
        assert!(media.image_url.is_none());

        let image: MediaEntry = serde_json::from_value(serde_json::json!({
            "type": "image",
            "url": "https://media.example/i.jpg",
            "duration": 5
        }))
        .unwrap();
        let media = to_media(&image);
        assert_eq!(media.image_url.as_deref(), Some("https://media.example/i.jpg"));
        assert!(media.duration.is_none());
        assert!(media.video_url.is_none());
    }

    #[test]
    fn errors_keep_their_class() {
        assert!(classify(ApifyError::Api { status: 429, message: String::new() }).is_transient());
        assert!(!classify(ApifyError::RunFailed("FAILED".into())).is_transient());
    }
}
