use async_trait::async_trait;

use crate::pipeline::stats::CycleStats;

/// Something an operator has to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// A post's `scrape_count` disagrees with its scrape events. The post is
    /// frozen until someone repairs it.
    StateInconsistency {
        post_url: String,
        scrape_count: i64,
        event_count: i64,
    },
    /// The cycle stopped early on a ledger or configuration failure.
    CycleFailed { cycle_id: String, error: String },
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alert::StateInconsistency {
                post_url,
                scrape_count,
                event_count,
            } => write!(
                f,
                "State inconsistency on {post_url}: scrape_count={scrape_count}, events={event_count}"
            ),
            Alert::CycleFailed { cycle_id, error } => write!(f, "Cycle {cycle_id} failed: {error}"),
        }
    }
}

/// Pluggable notification backend for operator alerts.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()>;

    /// Send a summary of a finished cycle.
    async fn send_digest(&self, stats: &CycleStats) -> anyhow::Result<()>;
}
