//! Pure Apify REST API client.
//!
//! A minimal client for the Apify platform API. Supports starting actor runs,
//! polling for completion, and fetching dataset results, plus typed wrappers
//! for the LinkedIn post reactions, post detail and profile actors.
//!
//! # Example
//!
//! ```rust,ignore
//! use apify_client::ApifyClient;
//!
//! let client = ApifyClient::new("your-api-token".into());
//!
//! let page = client
//!     .fetch_reactions_page("https://www.linkedin.com/posts/some-post", 1)
//!     .await?;
//! println!("{} reactions, ${:.2}", page.items.len(), page.cost_usd);
//! ```

pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    Experience, LinkedInProfile, MediaEntry, PostDetailItem, PostMediaInput, PostReactionsInput,
    PostRef, ProfileScraperInput, ReactionItem, ReactionMetadata, ReactionsPage, Reactor, RunData,
};

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for the LinkedIn post reactions scraper.
const LINKEDIN_POST_REACTIONS: &str = "J9UfswnR3Kae4O6vm";

/// Actor ID for the LinkedIn post detail scraper (text, media, counts).
const LINKEDIN_POST_DETAIL: &str = "d0DhjXPjkkwm4W5xK";

/// Actor ID for the LinkedIn profile scraper.
const LINKEDIN_PROFILE_SCRAPER: &str = "VhxlqQXRwhW8H5hNV";

/// Maximum reactions the actor returns per page.
pub const REACTIONS_PAGE_SIZE: u32 = 100;

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
}

/// Result of a completed actor run: its items and what it cost.
pub struct ActorOutput<T> {
    pub items: Vec<T>,
    pub cost_usd: f64,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Start an actor run with the given input. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", BASE_URL, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        loop {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", BASE_URL, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApifyError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let api_resp: ApiResponse<RunData> = resp.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", BASE_URL, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Run an actor end-to-end: start, poll, fetch the default dataset.
    pub async fn call_actor<I: Serialize, T: DeserializeOwned>(
        &self,
        actor_id: &str,
        input: &I,
    ) -> Result<ActorOutput<T>> {
        let run = self.start_run(actor_id, input).await?;
        tracing::debug!(run_id = %run.id, actor_id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::debug!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let items: Vec<T> = self
            .get_dataset_items(&completed.default_dataset_id)
            .await?;

        Ok(ActorOutput {
            items,
            cost_usd: completed.usage_total_usd.unwrap_or(0.0),
        })
    }

    /// Fetch a single page of reactions for a LinkedIn post. Pages are 1-based.
    pub async fn fetch_reactions_page(&self, post_url: &str, page_number: u32) -> Result<ReactionsPage> {
        let input = PostReactionsInput {
            post_url: post_url.to_string(),
            page_number,
            reaction_type: "ALL".to_string(),
            limit: REACTIONS_PAGE_SIZE,
        };

        let output: ActorOutput<ReactionItem> =
            self.call_actor(LINKEDIN_POST_REACTIONS, &input).await?;
        tracing::info!(
            post_url,
            page_number,
            count = output.items.len(),
            "Fetched reactions page"
        );

        Ok(ReactionsPage {
            page_number,
            items: output.items,
            cost_usd: output.cost_usd,
        })
    }

    /// Fetch a post's details. `items` is empty when the actor found nothing.
    pub async fn scrape_post_detail(&self, post_url: &str) -> Result<ActorOutput<PostDetailItem>> {
        let input = PostMediaInput {
            post_url: post_url.to_string(),
        };
        let output: ActorOutput<PostDetailItem> =
            self.call_actor(LINKEDIN_POST_DETAIL, &input).await?;
        tracing::info!(post_url, items = output.items.len(), "Fetched LinkedIn post detail");
        Ok(output)
    }

    /// Scrape a LinkedIn profile. `items` is empty when the actor found nothing.
    pub async fn scrape_profile(&self, profile_url: &str) -> Result<ActorOutput<LinkedInProfile>> {
        let input = ProfileScraperInput {
            username: profile_url.to_string(),
        };
        let output: ActorOutput<LinkedInProfile> =
            self.call_actor(LINKEDIN_PROFILE_SCRAPER, &input).await?;
        tracing::info!(profile_url, items = output.items.len(), "Fetched LinkedIn profile");
        Ok(output)
    }
}
