use serde::Serialize;

use crate::scheduling::SkipCounts;

/// Outcome counts for the scrape stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeStats {
    pub selected: u32,
    pub succeeded: u32,
    pub failed_transient: u32,
    pub failed_permanent: u32,
    /// Not a recognizable post URL; recorded as an attempt without calling the provider.
    pub skipped_invalid: u32,
    /// Never launched because the cycle budget ran out. No event recorded.
    pub skipped_budget: u32,
    /// Refused by the ledger because the post disagreed with its history.
    pub inconsistent: u32,
    pub engagers_inserted: u32,
    pub engagers_existing: u32,
    pub records_dropped: u32,
    pub records_collapsed: u32,
    pub cost_usd: f64,
}

impl ScrapeStats {
    pub fn attempted(&self) -> u32 {
        self.succeeded + self.failed_transient + self.failed_permanent + self.skipped_invalid
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichStats {
    pub profiles: u32,
    pub enriched: u32,
    /// Provider found nothing. Stamped anyway so it is not re-billed.
    pub empty: u32,
    pub failed: u32,
    pub rows_updated: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaStats {
    pub posts: u32,
    pub with_media: u32,
    /// Text-only posts, and posts the provider refused for good.
    pub without_media: u32,
    /// Left for next cycle.
    pub failed: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub candidates: u32,
    pub people: u32,
    pub created: u32,
    pub duplicates: u32,
    pub failed_transient: u32,
    pub failed_permanent: u32,
    pub rows_marked: u32,
    /// Rows another run flipped first. Our push result for them was discarded.
    pub rows_raced: u32,
}

/// Stats from one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    pub deferred: u32,
    pub schedule_skipped: SkipCounts,
    pub scrape: ScrapeStats,
    pub media: Option<MediaStats>,
    pub enrich: Option<EnrichStats>,
    pub sync: Option<SyncStats>,
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.scrape;
        writeln!(f, "\n=== Cycle Complete ===")?;
        writeln!(f, "Posts selected:      {}", s.selected)?;
        writeln!(f, "Posts deferred:      {}", self.deferred)?;
        writeln!(
            f,
            "Not eligible:        {} (exhausted={}, cooling={}, no reactions={})",
            self.schedule_skipped.total(),
            self.schedule_skipped.exhausted,
            self.schedule_skipped.cooling_down,
            self.schedule_skipped.diminishing_returns
        )?;
        writeln!(f, "\nScrape:")?;
        writeln!(f, "  Succeeded:         {}", s.succeeded)?;
        writeln!(f, "  Failed transient:  {}", s.failed_transient)?;
        writeln!(f, "  Failed permanent:  {}", s.failed_permanent)?;
        writeln!(f, "  Invalid URL:       {}", s.skipped_invalid)?;
        if s.skipped_budget > 0 {
            writeln!(f, "  Over budget:       {}", s.skipped_budget)?;
        }
        if s.inconsistent > 0 {
            writeln!(f, "  INCONSISTENT:      {}", s.inconsistent)?;
        }
        writeln!(f, "  New engagers:      {}", s.engagers_inserted)?;
        writeln!(f, "  Already known:     {}", s.engagers_existing)?;
        writeln!(f, "  Cost:              ${:.2}", s.cost_usd)?;

        if let Some(m) = &self.media {
            writeln!(f, "\nPost media:")?;
            writeln!(f, "  Posts:             {}", m.posts)?;
            writeln!(f, "  With media:        {}", m.with_media)?;
            writeln!(f, "  Without media:     {}", m.without_media)?;
            writeln!(f, "  Failed:            {}", m.failed)?;
        }

        if let Some(e) = &self.enrich {
            writeln!(f, "\nEnrichment:")?;
            writeln!(f, "  Profiles:          {}", e.profiles)?;
            writeln!(f, "  Enriched:          {}", e.enriched)?;
            writeln!(f, "  Empty:             {}", e.empty)?;
            writeln!(f, "  Failed:            {}", e.failed)?;
        }

        if let Some(y) = &self.sync {
            writeln!(f, "\nLead sync:")?;
            writeln!(f, "  People:            {}", y.people)?;
            writeln!(f, "  Created:           {}", y.created)?;
            writeln!(f, "  Duplicates:        {}", y.duplicates)?;
            writeln!(f, "  Failed:            {}", y.failed_transient + y.failed_permanent)?;
            writeln!(f, "  Rows marked:       {}", y.rows_marked)?;
            if y.rows_raced > 0 {
                writeln!(f, "  Raced:             {}", y.rows_raced)?;
            }
        }
        Ok(())
    }
}
