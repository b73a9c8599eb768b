use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use leadscout_common::{normalize_profile_url, EngagementRecord, NewEngager};

/// Counts from preparing one scrape's records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub received: usize,
    /// No usable profile URL.
    pub dropped_invalid: usize,
    /// Same profile seen earlier in this batch.
    pub collapsed: usize,
    pub kept: usize,
}

#[derive(Debug, Clone)]
pub struct Deduplicated {
    pub engagers: Vec<NewEngager>,
    pub stats: DedupStats,
}

/// Turn raw engagement records into insertable engager rows.
///
/// Profile URLs are normalized, records without one are dropped, and
/// repeats within the batch collapse onto the first occurrence. The ledger
/// then inserts each survivor only if its (profile, post) pair is new.
pub fn prepare(records: &[EngagementRecord]) -> Deduplicated {
    let mut stats = DedupStats {
        received: records.len(),
        ..DedupStats::default()
    };
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut engagers = Vec::with_capacity(records.len());

    for record in records {
        let Some(profile_url) = normalize_profile_url(&record.profile_url) else {
            stats.dropped_invalid += 1;
            continue;
        };
        if !seen.insert(profile_url.clone()) {
            stats.collapsed += 1;
            continue;
        }
        engagers.push(NewEngager {
            profile_url,
            name: clean(record.name.as_deref()),
            headline: clean(record.headline.as_deref()),
            engagement_type: record.engagement_type,
        });
    }

    stats.kept = engagers.len();
    if stats.dropped_invalid > 0 || stats.collapsed > 0 {
        debug!(?stats, "Engagement records deduplicated");
    }
    Deduplicated { engagers, stats }
}

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use leadscout_common::EngagementType;

    use super::*;

    fn record(url: &str, kind: EngagementType) -> EngagementRecord {
        EngagementRecord {
            profile_url: url.to_string(),
            name: Some(" Ada Lovelace ".into()),
            headline: Some("".into()),
            engagement_type: kind,
        }
    }

    #[test]
    fn first_occurrence_wins_within_a_batch() {
        let out = prepare(&[
            record("https://www.linkedin.com/in/ada/", EngagementType::Reaction),
            record("https://www.linkedin.com/in/ada?trk=feed", EngagementType::Comment),
            record("https://www.linkedin.com/in/grace", EngagementType::Repost),
        ]);

        assert_eq!(out.engagers.len(), 2);
        assert_eq!(out.engagers[0].profile_url, "https://www.linkedin.com/in/ada");
        assert_eq!(out.engagers[0].engagement_type, EngagementType::Reaction);
        assert_eq!(out.stats.collapsed, 1);
        assert_eq!(out.stats.kept, 2);
    }

    #[test]
    fn records_without_a_profile_are_dropped() {
        let out = prepare(&[
            record("", EngagementType::Reaction),
            record("   ", EngagementType::Reaction),
            record("linkedin user", EngagementType::Reaction),
        ]);

        assert!(out.engagers.is_empty());
        assert_eq!(out.stats.dropped_invalid, 3);
        assert_eq!(out.stats.received, 3);
    }

    #[test]
    fn text_fields_are_trimmed_and_blanks_become_none() {
        let out = prepare(&[record("https://www.linkedin.com/in/ada", EngagementType::Reaction)]);
        assert_eq!(out.engagers[0].name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(out.engagers[0].headline, None);
    }
}
