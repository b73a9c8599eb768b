pub mod config;
pub mod error;
pub mod types;
pub mod urls;

pub use config::{Config, EnrichConfig, MediaConfig, SchedulerConfig, ScrapeConfig, SyncConfig};
pub use error::{LeadScoutError, Result};
pub use types::*;
pub use urls::{is_linkedin_post_url, is_person_profile_url, normalize_profile_url};
