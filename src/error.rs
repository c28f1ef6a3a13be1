// User-facing error taxonomy. Every variant renders as `CODE: message` so callers
// can branch on the prefix without parsing the rest.

use crate::aggregation::AggregationError;
use crate::retry_fetch::FetchError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("TRANSIENT_NETWORK: {0}")]
    TransientNetwork(String),
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),
    #[error("STORE_ERROR: {0}")]
    Store(String),
    #[error("INTERNAL_ERROR: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::TransientNetwork(_) => "TRANSIENT_NETWORK",
            ServiceError::Upstream(_) => "UPSTREAM_ERROR",
            ServiceError::Store(_) => "STORE_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether repeating the same call can succeed without changing the input.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ServiceError::TransientNetwork(_) | ServiceError::Store(_) | ServiceError::Internal(_)
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }
}

impl From<FetchError> for ServiceError {
    fn from(e: FetchError) -> Self {
        if e.is_not_found() {
            ServiceError::NotFound(e.to_string())
        } else if e.is_retriable() {
            ServiceError::TransientNetwork(e.to_string())
        } else {
            ServiceError::Upstream(e.to_string())
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(message) => ServiceError::NotFound(message),
            StoreError::Conflict(message) => ServiceError::Conflict(message),
            other => ServiceError::Store(other.to_string()),
        }
    }
}

impl From<AggregationError> for ServiceError {
    fn from(e: AggregationError) -> Self {
        match e {
            AggregationError::UnknownRegion(_) => ServiceError::Validation(e.to_string()),
            AggregationError::AllSourcesFailed { .. } => ServiceError::Internal(e.to_string()),
        }
    }
}
