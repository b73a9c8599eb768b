pub mod apify;
pub mod hubspot;

pub use apify::{ApifyEnricher, ApifyPostMedia, ApifyScraper};
pub use hubspot::HubSpotCrm;
