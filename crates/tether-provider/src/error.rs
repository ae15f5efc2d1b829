//! Provider error types with transient/permanent classification.

use thiserror::Error;

/// Error that can occur when calling a provider action.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The gateway or provider endpoint could not be reached, or the call
    /// timed out. Transient.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider rejected the payload with a structured error.
    #[error("provider rejected payload (status {status}): {error_code}")]
    Validation { status: u16, error_code: String },

    /// The provider's server-side fuzzy matching found an existing record
    /// instead of creating a new one.
    ///
    /// This is an identity resolution, not a failure: the caller should
    /// adopt `matched_id` as the record's external id.
    #[error("provider matched an existing record: {matched_id}")]
    DuplicateDetected { matched_id: String },

    /// The response body did not match any known envelope shape.
    #[error("unexpected response shape: {message}")]
    UnexpectedShape { message: String },

    /// Request or response body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ProviderError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with an underlying cause.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ProviderError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unexpected-shape error.
    pub fn unexpected_shape(message: impl Into<String>) -> Self {
        ProviderError::UnexpectedShape {
            message: message.into(),
        }
    }

    /// Check if this error is transient and the call may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Network { .. })
    }

    /// Check if this error carries a duplicate-match resolution.
    #[must_use]
    pub fn duplicate_match(&self) -> Option<&str> {
        match self {
            ProviderError::DuplicateDetected { matched_id } => Some(matched_id),
            _ => None,
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::network("connection refused").is_transient());
        assert!(!ProviderError::Validation {
            status: 400,
            error_code: "REQUIRED_FIELD_MISSING".to_string(),
        }
        .is_transient());
        assert!(!ProviderError::unexpected_shape("no output").is_transient());
    }

    #[test]
    fn test_duplicate_match_accessor() {
        let err = ProviderError::DuplicateDetected {
            matched_id: "001Y".to_string(),
        };
        assert_eq!(err.duplicate_match(), Some("001Y"));
        assert_eq!(ProviderError::network("x").duplicate_match(), None);
    }

    #[test]
    fn test_validation_display() {
        let err = ProviderError::Validation {
            status: 400,
            error_code: "DUPLICATES_DETECTED".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("400"));
        assert!(s.contains("DUPLICATES_DETECTED"));
    }
}
