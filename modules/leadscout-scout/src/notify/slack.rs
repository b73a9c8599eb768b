use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::{Alert, NotifyBackend};
use crate::pipeline::stats::CycleStats;

/// Slack incoming webhook notification backend.
pub struct SlackWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned non-success");
            anyhow::bail!("Slack webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for SlackWebhook {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        let text = match alert {
            Alert::StateInconsistency { post_url, .. } => format!(
                ":rotating_light: *LeadScout ledger inconsistency*\n{alert}\n\n\
                 *Suggested action:* run `leadscout audit` and repair `{post_url}` before the next cycle."
            ),
            Alert::CycleFailed { .. } => format!(":x: *LeadScout cycle failed*\n{alert}"),
        };

        self.post(json!({ "text": text, "unfurl_links": false })).await
    }

    async fn send_digest(&self, stats: &CycleStats) -> anyhow::Result<()> {
        let scrape = &stats.scrape;
        let created = stats.sync.as_ref().map(|s| s.created).unwrap_or(0);
        if scrape.attempted() == 0 && created == 0 {
            // Nothing to report
            return Ok(());
        }

        let mut lines = vec![":mag: *LeadScout cycle complete*".to_string()];
        lines.push(format!(
            "Scraped {} post(s): {} ok, {} failed, {} invalid. Cost ${:.2}.",
            scrape.attempted(),
            scrape.succeeded,
            scrape.failed_transient + scrape.failed_permanent,
            scrape.skipped_invalid,
            scrape.cost_usd
        ));
        lines.push(format!("New engagers: {}", scrape.engagers_inserted));
        if let Some(sync) = &stats.sync {
            lines.push(format!(
                "Leads sent to HubSpot: {} new, {} already there, {} failed",
                sync.created,
                sync.duplicates,
                sync.failed_transient + sync.failed_permanent
            ));
        }
        if scrape.inconsistent > 0 {
            lines.push(format!(":warning: {} post(s) refused as inconsistent", scrape.inconsistent));
        }

        self.post(json!({ "text": lines.join("\n"), "unfurl_links": false })).await
    }
}
