use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No user id could be obtained, so no authenticated call is attempted
    #[error("user identity unavailable: {0}")]
    Identity(String),

    #[error("coupon service rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl ApiError {
    /// Text suitable for the notification surface
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected(message) => message.clone(),
            _ => "Failed to add coupon code. Please try again.".to_string(),
        }
    }
}
