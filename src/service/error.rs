use axum::http::StatusCode;
use thiserror::Error;

use crate::{db::StoreError, error::HttpError, mail::MailError};

/// Every failure a waitlist call can end in. Shared by the server-side
/// services and the HTTP client so both ends speak the same outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitlistError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Unknown(String),
}

impl WaitlistError {
    pub fn rate_limited() -> Self {
        WaitlistError::RateLimited(
            "Too many attempts. Please wait a minute and try again.".to_string(),
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WaitlistError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WaitlistError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            WaitlistError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WaitlistError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WaitlistError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller should offer a retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WaitlistError::RateLimited(_) | WaitlistError::Unavailable(_)
        )
    }
}

impl From<StoreError> for WaitlistError {
    fn from(error: StoreError) -> Self {
        tracing::error!("Storage failure: {}", error);
        WaitlistError::Unavailable("We could not reach the waitlist right now. Please try again.".to_string())
    }
}

impl From<MailError> for WaitlistError {
    fn from(error: MailError) -> Self {
        tracing::error!("Mail delivery failure: {}", error);
        WaitlistError::Unavailable("We could not send your access link. Please try again.".to_string())
    }
}

impl From<WaitlistError> for HttpError {
    fn from(error: WaitlistError) -> Self {
        let status = error.status_code();
        HttpError::new(error.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            WaitlistError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(WaitlistError::rate_limited().status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            WaitlistError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(WaitlistError::rate_limited().is_retryable());
        assert!(WaitlistError::Unavailable("down".into()).is_retryable());
        assert!(!WaitlistError::InvalidInput("bad".into()).is_retryable());
        assert!(!WaitlistError::Unauthorized("no".into()).is_retryable());
    }

    #[test]
    fn store_errors_surface_as_unavailable() {
        let error: WaitlistError = StoreError::Timeout(std::time::Duration::from_secs(5)).into();
        assert!(matches!(error, WaitlistError::Unavailable(_)));
    }
}
