use thiserror::Error;

#[derive(Error, Debug)]
pub enum OtzyvError {
    /// No strategy could resolve an organization id from the supplied URL.
    /// The message is user-facing and shown as-is.
    #[error("{0}")]
    InvalidUrl(String),

    /// The organization page could not be retrieved. Retryable.
    #[error("failed to fetch Yandex Maps page: {0}")]
    Upstream(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
}

impl OtzyvError {
    /// True when the caller must fix their input (400-class) rather than
    /// retry later (500-class).
    pub fn is_user_error(&self) -> bool {
        matches!(self, OtzyvError::InvalidUrl(_))
    }
}

pub type Result<T> = std::result::Result<T, OtzyvError>;
