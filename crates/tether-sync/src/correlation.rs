//! Correlation store: the local/external identity mapping.
//!
//! Every entity that exists on both sides is linked by a correlation row
//! keyed by tenant, entity kind, provider, and local id. All pairing
//! decisions during push, pull, and drift detection go through this store,
//! and the unique key closes the create race: two concurrent writers for
//! the same local row converge on a single correlation.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tether_provider::{EntityKind, ProviderKind};

use crate::error::{SyncError, SyncResult};

/// A single local/external identity link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationRecord {
    pub tenant_id: Uuid,
    pub kind: EntityKind,
    pub provider: ProviderKind,
    pub local_id: Uuid,
    pub external_id: String,
}

impl CorrelationRecord {
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        local_id: Uuid,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            kind,
            provider,
            local_id,
            external_id: external_id.into(),
        }
    }
}

/// Persistence for correlation records.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Find the external id linked to a local id.
    async fn find(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        local_id: Uuid,
    ) -> SyncResult<Option<CorrelationRecord>>;

    /// Find the local id linked to an external id.
    async fn find_by_external(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        external_id: &str,
    ) -> SyncResult<Option<CorrelationRecord>>;

    /// Insert or refresh a correlation. On conflict with the unique key
    /// the external id is overwritten, so a re-pushed record that was
    /// re-created externally picks up its new id.
    async fn upsert(&self, record: &CorrelationRecord) -> SyncResult<()>;

    /// Remove the correlation for a local id, if any.
    async fn delete(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        local_id: Uuid,
    ) -> SyncResult<()>;

    /// Remove the correlation tracking an external id, if any.
    async fn delete_by_external(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        external_id: &str,
    ) -> SyncResult<()>;

    /// All external ids currently tracked for a tenant/kind/provider.
    async fn tracked_external_ids(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
    ) -> SyncResult<HashSet<String>>;

    /// All correlations for a tenant/kind/provider.
    async fn list(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
    ) -> SyncResult<Vec<CorrelationRecord>>;
}

#[derive(Debug, sqlx::FromRow)]
struct CorrelationRow {
    tenant_id: Uuid,
    entity_type_id: i16,
    provider: String,
    local_id: Uuid,
    external_id: String,
    #[allow(dead_code)]
    updated_at: Option<DateTime<Utc>>,
}

impl CorrelationRow {
    fn into_record(self) -> SyncResult<CorrelationRecord> {
        let kind = EntityKind::from_type_id(self.entity_type_id).ok_or_else(|| {
            SyncError::internal(format!(
                "unknown entity type id in correlation row: {}",
                self.entity_type_id
            ))
        })?;
        let provider = self.provider.parse().map_err(SyncError::internal)?;
        Ok(CorrelationRecord {
            tenant_id: self.tenant_id,
            kind,
            provider,
            local_id: self.local_id,
            external_id: self.external_id,
        })
    }
}

/// Postgres-backed [`CorrelationStore`] over the `entity_correlation`
/// table.
#[derive(Debug, Clone)]
pub struct PgCorrelationStore {
    pool: PgPool,
}

impl PgCorrelationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CorrelationStore for PgCorrelationStore {
    async fn find(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        local_id: Uuid,
    ) -> SyncResult<Option<CorrelationRecord>> {
        let row = sqlx::query_as::<_, CorrelationRow>(
            r#"
            SELECT tenant_id, entity_type_id, provider, local_id, external_id, updated_at
            FROM entity_correlation
            WHERE tenant_id = $1 AND entity_type_id = $2 AND provider = $3 AND local_id = $4
            "#,
        )
        .bind(tenant_id)
        .bind(kind.type_id())
        .bind(provider.as_str())
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CorrelationRow::into_record).transpose()
    }

    async fn find_by_external(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        external_id: &str,
    ) -> SyncResult<Option<CorrelationRecord>> {
        let row = sqlx::query_as::<_, CorrelationRow>(
            r#"
            SELECT tenant_id, entity_type_id, provider, local_id, external_id, updated_at
            FROM entity_correlation
            WHERE tenant_id = $1 AND entity_type_id = $2 AND provider = $3 AND external_id = $4
            "#,
        )
        .bind(tenant_id)
        .bind(kind.type_id())
        .bind(provider.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CorrelationRow::into_record).transpose()
    }

    async fn upsert(&self, record: &CorrelationRecord) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_correlation
                (tenant_id, entity_type_id, provider, local_id, external_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (tenant_id, entity_type_id, provider, local_id)
            DO UPDATE SET external_id = EXCLUDED.external_id, updated_at = NOW()
            "#,
        )
        .bind(record.tenant_id)
        .bind(record.kind.type_id())
        .bind(record.provider.as_str())
        .bind(record.local_id)
        .bind(&record.external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        local_id: Uuid,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            DELETE FROM entity_correlation
            WHERE tenant_id = $1 AND entity_type_id = $2 AND provider = $3 AND local_id = $4
            "#,
        )
        .bind(tenant_id)
        .bind(kind.type_id())
        .bind(provider.as_str())
        .bind(local_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_by_external(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
        external_id: &str,
    ) -> SyncResult<()> {
        sqlx::query(
            r#"
            DELETE FROM entity_correlation
            WHERE tenant_id = $1 AND entity_type_id = $2 AND provider = $3 AND external_id = $4
            "#,
        )
        .bind(tenant_id)
        .bind(kind.type_id())
        .bind(provider.as_str())
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tracked_external_ids(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
    ) -> SyncResult<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT external_id FROM entity_correlation
            WHERE tenant_id = $1 AND entity_type_id = $2 AND provider = $3
            "#,
        )
        .bind(tenant_id)
        .bind(kind.type_id())
        .bind(provider.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
        provider: ProviderKind,
    ) -> SyncResult<Vec<CorrelationRecord>> {
        let rows = sqlx::query_as::<_, CorrelationRow>(
            r#"
            SELECT tenant_id, entity_type_id, provider, local_id, external_id, updated_at
            FROM entity_correlation
            WHERE tenant_id = $1 AND entity_type_id = $2 AND provider = $3
            ORDER BY updated_at DESC NULLS LAST
            "#,
        )
        .bind(tenant_id)
        .bind(kind.type_id())
        .bind(provider.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CorrelationRow::into_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_into_record() {
        let row = CorrelationRow {
            tenant_id: Uuid::new_v4(),
            entity_type_id: 2,
            provider: "salesforce".to_string(),
            local_id: Uuid::new_v4(),
            external_id: "001XX0000001".to_string(),
            updated_at: Some(Utc::now()),
        };
        let record = row.into_record().unwrap();
        assert_eq!(record.kind, EntityKind::Account);
        assert_eq!(record.provider, ProviderKind::Salesforce);
    }

    #[test]
    fn test_row_rejects_unknown_type_id() {
        let row = CorrelationRow {
            tenant_id: Uuid::new_v4(),
            entity_type_id: 9,
            provider: "salesforce".to_string(),
            local_id: Uuid::new_v4(),
            external_id: "x".to_string(),
            updated_at: None,
        };
        assert!(row.into_record().is_err());
    }
}
