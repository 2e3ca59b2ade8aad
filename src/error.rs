use thiserror::Error;

/// Failure talking to the match data source.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network, HTTP 5xx or payload parse failure; worth retrying.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transient(_) => true,
            FetchError::Rejected { status, .. } => *status == 429,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transient(e.to_string())
    }
}

/// Failure delivering an operator notification.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("notifier credentials are not configured")]
    MissingCredentials,

    #[error("notification rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::MissingCredentials => false,
            DeliveryError::Rejected { status, .. } => *status == 429 || *status >= 500,
            DeliveryError::Transport(_) => true,
        }
    }
}
