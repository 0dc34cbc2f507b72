use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    /// A referenced entity (coupon, quote, session, product, order) does not exist.
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    /// A uniqueness or optimistic-concurrency check failed.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Malformed input or a definition that violates a domain invariant.
    #[error("Invalid: {0}")]
    Invalid(String),
    /// The processor refused the charge. Surfaced verbatim, never retried.
    #[error("Processor declined: {0}")]
    ProcessorDeclined(String),
    /// Transient processor outage. Safe to retry the whole call.
    #[error("Processor unavailable: {0}")]
    ProcessorUnavailable(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

impl CheckoutError {
    /// True when retrying the same call with the same idempotency key is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::ProcessorUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(CheckoutError::ProcessorUnavailable("timeout".into()).is_retryable());
        assert!(!CheckoutError::ProcessorDeclined("card_declined".into()).is_retryable());
        assert!(!CheckoutError::Conflict("duplicate".into()).is_retryable());
    }
}
