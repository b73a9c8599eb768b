use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use leadscout_common::{LeadScoutError, MediaConfig, PostMedia, Result};
use leadscout_ledger::Ledger;

use super::stats::MediaStats;
use crate::traits::PostMediaScraper;

/// Records what media each tracked post carries, once per post.
///
/// Runs one lookup at a time. Transient failures leave the post for the next
/// cycle; anything else marks it done, with or without media.
pub struct PostMediaStage {
    ledger: Arc<dyn Ledger>,
    scraper: Arc<dyn PostMediaScraper>,
    config: MediaConfig,
}

impl PostMediaStage {
    pub fn new(ledger: Arc<dyn Ledger>, scraper: Arc<dyn PostMediaScraper>, config: MediaConfig) -> Self {
        Self {
            ledger,
            scraper,
            config,
        }
    }

    pub async fn run(&self) -> Result<MediaStats> {
        let posts = self.ledger.posts_needing_media(self.config.max_per_cycle).await?;
        let mut stats = MediaStats {
            posts: posts.len() as u32,
            ..MediaStats::default()
        };
        if posts.is_empty() {
            return Ok(stats);
        }
        info!(posts = posts.len(), "Looking up post media");

        for post_url in &posts {
            let outcome = match timeout(self.config.call_timeout, self.scraper.media(post_url)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LeadScoutError::timeout(
                    "post media lookup",
                    self.config.call_timeout.as_secs(),
                )),
            };

            let media = match outcome {
                Ok(media) => media,
                Err(e) if e.is_transient() => {
                    warn!(post_url = %post_url, error = %e, "Post media lookup failed, will retry next cycle");
                    stats.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!(post_url = %post_url, error = %e, "Post media lookup failed permanently");
                    PostMedia::default()
                }
            };

            if media.is_empty() {
                stats.without_media += 1;
            } else {
                stats.with_media += 1;
            }
            if !self.ledger.record_post_media(post_url, &media, Utc::now()).await? {
                debug!(post_url = %post_url, "Post media already recorded by another run");
            }
        }

        info!(
            with_media = stats.with_media,
            without_media = stats.without_media,
            failed = stats.failed,
            "Post media complete"
        );
        Ok(stats)
    }
}
