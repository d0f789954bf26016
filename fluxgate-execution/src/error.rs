use crate::order::OrderId;
use thiserror::Error;

/// Venue client failures, by kind rather than by venue.
///
/// `Timeout` and `RateLimit` are transient and deliberately carry fixed
/// short descriptions; `OrderNotFound` is special-cased by the cancel
/// path.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ClientError {
    #[error("Timeout error")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("connectivity: {0}")]
    Connectivity(String),

    #[error("api: {0}")]
    Api(String),
}

impl ClientError {
    /// Transient failures are retried by the caller and never logged as
    /// unhandled.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Timeout | ClientError::RateLimit)
    }
}
