use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubSpotError>;

#[derive(Debug, Error)]
pub enum HubSpotError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl HubSpotError {
    /// Network failures, 429 rate limits and 5xx responses are worth retrying
    /// on a later cycle. Validation and auth failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            HubSpotError::Network(_) => true,
            HubSpotError::Api { status, .. } => *status == 429 || *status >= 500,
            HubSpotError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for HubSpotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return HubSpotError::Parse(err.to_string());
        }
        HubSpotError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HubSpotError {
    fn from(err: serde_json::Error) -> Self {
        HubSpotError::Parse(err.to_string())
    }
}
