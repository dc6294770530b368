use thiserror::Error;

/// Domain-specific error types for the pre-roll plugin
#[derive(Error, Debug)]
pub enum PrerollError {
    #[error("Failed to fetch ad decision: {0}")]
    DecisionFetch(#[from] reqwest::Error),

    #[error("Ad decision endpoint returned status {0}")]
    DecisionStatus(u16),

    #[error("Failed to parse VAST document: {0}")]
    VastParse(String),

    #[error("Host player is missing a required capability: {0}")]
    MissingCapability(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrerollError {
    /// Whether the error came from the network rather than the payload
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            PrerollError::DecisionFetch(_) | PrerollError::DecisionStatus(_)
        )
    }
}

// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, PrerollError>;
