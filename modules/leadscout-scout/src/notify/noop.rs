use async_trait::async_trait;

use super::backend::{Alert, NotifyBackend};
use crate::pipeline::stats::CycleStats;

/// Used when no webhook is configured.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send(&self, _alert: &Alert) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_digest(&self, _stats: &CycleStats) -> anyhow::Result<()> {
        Ok(())
    }
}
