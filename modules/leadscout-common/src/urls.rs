use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static RE_LINKEDIN_POST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://([a-z]{2,3}\.)?(www\.)?linkedin\.com/(posts/|feed/update/|embed/feed/update/)\S+$")
        .expect("valid regex")
});

/// Whether a URL looks like a LinkedIn post the reactions actor can scrape.
pub fn is_linkedin_post_url(url: &str) -> bool {
    RE_LINKEDIN_POST.is_match(url.trim())
}

/// Person profiles live under `/in/`; company pages and showcase pages do not.
pub fn is_person_profile_url(url: &str) -> bool {
    url.contains("/in/")
}

/// Canonical form of a profile URL for the (profile, post) uniqueness key.
///
/// Drops the query string, fragment and trailing slash. Path case is kept:
/// LinkedIn member ids (`ACoAA...`) are case-sensitive. Returns `None` for
/// blank or unparseable input.
pub fn normalize_profile_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut parsed = Url::parse(trimmed).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.set_query(None);
    parsed.set_fragment(None);

    let mut out = parsed.to_string();
    if parsed.path() != "/" {
        while out.ends_with('/') {
            out.pop();
        }
    }
    Some(out)
}
