use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run failed with status: {0}")]
    RunFailed(String),
}

impl ApifyError {
    /// Whether retrying the same request later could plausibly succeed.
    ///
    /// Network failures, rate limits, server errors and runs that hit the
    /// actor timeout are transient. Everything else (bad input, auth,
    /// unparseable datasets, crashed actors) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ApifyError::Network(_) => true,
            ApifyError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            ApifyError::Parse(_) => false,
            ApifyError::RunFailed(status) => status == "TIMED-OUT",
        }
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApifyError::Parse(err.to_string());
        }
        ApifyError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(ApifyError::Api { status: 429, message: String::new() }.is_transient());
        assert!(ApifyError::Api { status: 503, message: String::new() }.is_transient());
        assert!(ApifyError::Network("reset".into()).is_transient());
        assert!(ApifyError::RunFailed("TIMED-OUT".into()).is_transient());
    }

    #[test]
    fn auth_and_bad_input_are_permanent() {
        assert!(!ApifyError::Api { status: 401, message: String::new() }.is_transient());
        assert!(!ApifyError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!ApifyError::RunFailed("FAILED".into()).is_transient());
        assert!(!ApifyError::Parse("eof".into()).is_transient());
    }
}
