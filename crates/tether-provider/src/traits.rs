//! Provider action trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderResult;
use crate::types::{EntityKind, ExternalRecord, ProviderKind};

/// The four actions a provider connection supports, per entity kind.
///
/// Implementations own transport, authentication and pagination; callers see
/// normalized payloads and typed errors. Create failures caused by
/// server-side fuzzy matching surface as
/// [`ProviderError::DuplicateDetected`](crate::ProviderError::DuplicateDetected)
/// so the caller can adopt the matched id instead of treating the call as
/// failed.
#[async_trait]
pub trait ProviderActions: Send + Sync {
    /// Which provider this connection talks to.
    fn provider(&self) -> ProviderKind;

    /// Create a record, returning the provider-assigned id.
    async fn create(&self, kind: EntityKind, payload: &Value) -> ProviderResult<String>;

    /// Update an existing record in place.
    async fn update(&self, kind: EntityKind, external_id: &str, payload: &Value)
        -> ProviderResult<()>;

    /// Delete a record.
    async fn delete(&self, kind: EntityKind, external_id: &str) -> ProviderResult<()>;

    /// Fetch the complete record set for a kind.
    ///
    /// The returned set must be untruncated: drift detection computes set
    /// differences against it, and a partial fetch would make every missing
    /// record look deleted. Pagination is this method's responsibility.
    async fn fetch_all(&self, kind: EntityKind) -> ProviderResult<Vec<ExternalRecord>>;
}
