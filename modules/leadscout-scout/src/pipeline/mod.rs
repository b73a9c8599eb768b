pub mod coordinator;
pub mod dedup;
pub mod enrichment;
pub mod lead_sync;
pub mod post_media;
pub mod stats;

pub use coordinator::ScrapeCoordinator;
pub use enrichment::EnrichmentStage;
pub use lead_sync::LeadSyncEngine;
pub use post_media::PostMediaStage;
pub use stats::{CycleStats, EnrichStats, MediaStats, ScrapeStats, SyncStats};
