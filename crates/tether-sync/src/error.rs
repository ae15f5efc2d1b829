//! Sync error types.

use thiserror::Error;
use uuid::Uuid;

use tether_provider::{EntityKind, ProviderError};

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Provider call failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A pulled child record references a parent by external id that has no
    /// correlation. The child must be skipped, never inserted with a
    /// fabricated parent reference.
    #[error("No correlation for {kind} external id {external_id}")]
    MissingCorrelation {
        kind: EntityKind,
        external_id: String,
    },

    /// Mapping between local and external shapes failed.
    #[error("Mapping error for {kind}: {message}")]
    Mapping { kind: EntityKind, message: String },

    /// No mapper registered for an entity kind.
    #[error("No mapper registered for {kind}")]
    MapperNotFound { kind: EntityKind },

    /// Row or entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a missing-correlation error.
    pub fn missing_correlation(kind: EntityKind, external_id: impl Into<String>) -> Self {
        Self::MissingCorrelation {
            kind,
            external_id: external_id.into(),
        }
    }

    /// Create a mapping error.
    pub fn mapping(kind: EntityKind, message: impl Into<String>) -> Self {
        Self::Mapping {
            kind,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a not-found error for a local entity id.
    pub fn entity_not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound {
            entity: kind.as_str().to_string(),
            id: id.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable on a later pass.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Database(_) => true,
            SyncError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
