use thiserror::Error;

pub type Result<T> = std::result::Result<T, LeadScoutError>;

#[derive(Error, Debug)]
pub enum LeadScoutError {
    /// Network, timeout or rate limit. Retried on the next cycle, never within one.
    #[error("Transient external error: {0}")]
    TransientExternal(String),

    /// Malformed response, bad input or unauthorized. Recorded as a terminal attempt.
    #[error("Permanent external error: {0}")]
    PermanentExternal(String),

    /// A uniqueness or foreign-key conflict the caller did not absorb.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A post row disagrees with its own scrape history.
    #[error("State inconsistency on {post_url}: scrape_count={scrape_count} but {event_count} scrape events")]
    StateInconsistency {
        post_url: String,
        scrape_count: i64,
        event_count: i64,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LeadScoutError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LeadScoutError::TransientExternal(_))
    }

    /// Errors that mean the ledger itself is unusable and the cycle must stop.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, LeadScoutError::Database(_) | LeadScoutError::Config(_))
    }

    pub fn timeout(what: &str, secs: u64) -> Self {
        LeadScoutError::TransientExternal(format!("{what} timed out after {secs}s"))
    }
}
