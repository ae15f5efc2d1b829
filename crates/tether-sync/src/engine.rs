//! Reconciliation engine: push and pull passes plus single-record
//! operations.
//!
//! Passes are per-record fault isolated: one record's mapping or provider
//! failure is recorded in the pass summary and the pass moves on. Only
//! infrastructure failures that would invalidate the whole pass (loading
//! the local row set, fetching the external record set) abort it.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tether_provider::{
    EntityKind, ExternalRecord, ProviderActions, ProviderError, ProviderKind,
};

use crate::correlation::{CorrelationRecord, CorrelationStore};
use crate::entity::{EntityTopology, LocalEntity, Table};
use crate::error::{SyncError, SyncResult};
use crate::mapper::{LocalWrite, MapContext, MapperRegistry};
use crate::scope::SyncScope;
use crate::store::{Filter, RowStore};

/// Outcome of reconciling one record.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    /// Record had no counterpart and one was created.
    Created { local_id: Uuid, external_id: String },
    /// Record was already correlated and its counterpart was updated.
    Updated { local_id: Uuid, external_id: String },
    /// The provider reported a duplicate; the existing external record
    /// was adopted instead of creating a new one.
    Deduplicated { local_id: Uuid, external_id: String },
    /// Record was skipped, typically over an unresolvable parent
    /// reference. Retried on the next pass.
    Skipped { id: String, reason: String },
    /// Record failed and was left untouched.
    Failed { id: String, error: String },
}

/// Aggregated result of one pass over one entity kind.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub created: usize,
    pub updated: usize,
    pub deduplicated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl PassSummary {
    pub fn record(&mut self, outcome: RecordOutcome) {
        match &outcome {
            RecordOutcome::Created { .. } => self.created += 1,
            RecordOutcome::Updated { .. } => self.updated += 1,
            RecordOutcome::Deduplicated { .. } => self.deduplicated += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Total records processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every record converged (nothing skipped or failed).
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }
}

fn row_uuid(row: &Value, column: &str) -> Option<Uuid> {
    row.get(column)
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Bidirectional reconciliation between local rows and one provider
/// connection.
pub struct ReconciliationEngine {
    provider: Arc<dyn ProviderActions>,
    correlations: Arc<dyn CorrelationStore>,
    rows: Arc<dyn RowStore>,
    mappers: Arc<MapperRegistry>,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ProviderActions>,
        correlations: Arc<dyn CorrelationStore>,
        rows: Arc<dyn RowStore>,
        mappers: Arc<MapperRegistry>,
    ) -> Self {
        Self {
            provider,
            correlations,
            rows,
            mappers,
        }
    }

    fn provider_kind(&self) -> ProviderKind {
        self.provider.provider()
    }

    /// Resolve the tenant's default group/stage/priority once per pass.
    async fn resolve_context(&self, scope: SyncScope) -> SyncResult<MapContext> {
        let mut ctx = MapContext::new(scope.tenant_id, scope.owner_id);

        let group = self
            .rows
            .select_one(
                Table::EntityGroup,
                &[Filter::uuid("tenant_id", scope.tenant_id)],
                &[],
            )
            .await?;
        ctx.group_id = group.as_ref().and_then(|g| row_uuid(g, "id"));

        if let Some(group_id) = ctx.group_id {
            ctx.stage_id = self
                .rows
                .select_one(Table::EntityStage, &[Filter::uuid("group_id", group_id)], &[])
                .await?
                .as_ref()
                .and_then(|s| row_uuid(s, "id"));
            ctx.priority_id = self
                .rows
                .select_one(
                    Table::EntityPriority,
                    &[Filter::uuid("group_id", group_id)],
                    &[],
                )
                .await?
                .as_ref()
                .and_then(|p| row_uuid(p, "id"));
        }
        Ok(ctx)
    }

    /// External id of the account a contact links to, if the contact has
    /// one and it is correlated.
    async fn contact_parent_external_id(
        &self,
        scope: SyncScope,
        entity: &LocalEntity,
    ) -> SyncResult<Option<String>> {
        let LocalEntity::Contact(contact) = entity else {
            return Ok(None);
        };
        let Some(account_id) = contact.account_id else {
            return Ok(None);
        };
        let correlation = self
            .correlations
            .find(
                scope.tenant_id,
                EntityKind::Account,
                self.provider_kind(),
                account_id,
            )
            .await?;
        Ok(correlation.map(|c| c.external_id))
    }

    /// Push one already-loaded entity. Provider errors come back as an
    /// outcome, never as an `Err`, so batch passes stay fault isolated.
    async fn push_entity(
        &self,
        scope: SyncScope,
        ctx: &MapContext,
        entity: &LocalEntity,
    ) -> SyncResult<RecordOutcome> {
        let kind = entity.kind();
        let local_id = entity.id();
        let provider_kind = self.provider_kind();

        let parent_external_id = self.contact_parent_external_id(scope, entity).await?;
        let record_ctx = ctx
            .clone()
            .with_parent_external_id(parent_external_id);

        let payload = match self.mappers.get(kind)?.to_external(entity, &record_ctx) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = %kind, local_id = %local_id, error = %e, "Outbound mapping failed");
                return Ok(RecordOutcome::Failed {
                    id: local_id.to_string(),
                    error: e.to_string(),
                });
            }
        };

        let existing = self
            .correlations
            .find(scope.tenant_id, kind, provider_kind, local_id)
            .await?;

        if let Some(correlation) = existing {
            return match self
                .provider
                .update(kind, &correlation.external_id, &payload)
                .await
            {
                Ok(()) => Ok(RecordOutcome::Updated {
                    local_id,
                    external_id: correlation.external_id,
                }),
                Err(e) => {
                    warn!(kind = %kind, local_id = %local_id, error = %e, "Push update failed");
                    Ok(RecordOutcome::Failed {
                        id: local_id.to_string(),
                        error: e.to_string(),
                    })
                }
            };
        }

        match self.provider.create(kind, &payload).await {
            Ok(external_id) => {
                self.correlations
                    .upsert(&CorrelationRecord::new(
                        scope.tenant_id,
                        kind,
                        provider_kind,
                        local_id,
                        &external_id,
                    ))
                    .await?;
                Ok(RecordOutcome::Created {
                    local_id,
                    external_id,
                })
            }
            Err(ProviderError::DuplicateDetected { matched_id }) => {
                // The provider already holds this record; adopt its id
                // instead of forcing a second copy.
                self.correlations
                    .upsert(&CorrelationRecord::new(
                        scope.tenant_id,
                        kind,
                        provider_kind,
                        local_id,
                        &matched_id,
                    ))
                    .await?;
                info!(kind = %kind, local_id = %local_id, external_id = %matched_id, "Adopted duplicate match");
                Ok(RecordOutcome::Deduplicated {
                    local_id,
                    external_id: matched_id,
                })
            }
            Err(e) => {
                warn!(kind = %kind, local_id = %local_id, error = %e, "Push create failed");
                Ok(RecordOutcome::Failed {
                    id: local_id.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Push all of the scope's local records of one kind to the provider.
    #[instrument(skip(self), fields(provider = %self.provider_kind(), kind = %kind, tenant = %scope.tenant_id))]
    pub async fn push(&self, scope: SyncScope, kind: EntityKind) -> SyncResult<PassSummary> {
        let ctx = self.resolve_context(scope).await?;
        let rows = self
            .rows
            .select(
                kind.table(),
                &[Filter::uuid(kind.owner_column(), scope.owner_id)],
                kind.embeds(),
            )
            .await?;

        let mut summary = PassSummary::default();
        for row in rows {
            let entity = match LocalEntity::from_row(kind, row) {
                Ok(entity) => entity,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Skipping malformed local row");
                    summary.record(RecordOutcome::Failed {
                        id: String::new(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let outcome = self.push_entity(scope, &ctx, &entity).await?;
            summary.record(outcome);
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            deduplicated = summary.deduplicated,
            failed = summary.failed,
            "Push pass complete"
        );
        Ok(summary)
    }

    /// Push a single local record. Unlike a batch pass, provider failures
    /// propagate to the caller.
    #[instrument(skip(self), fields(provider = %self.provider_kind(), kind = %kind))]
    pub async fn push_one(
        &self,
        scope: SyncScope,
        kind: EntityKind,
        local_id: Uuid,
    ) -> SyncResult<RecordOutcome> {
        let ctx = self.resolve_context(scope).await?;
        let row = self
            .rows
            .select_one(kind.table(), &[Filter::uuid("id", local_id)], kind.embeds())
            .await?
            .ok_or_else(|| SyncError::entity_not_found(kind, local_id))?;
        let entity = LocalEntity::from_row(kind, row)?;

        match self.push_entity(scope, &ctx, &entity).await? {
            RecordOutcome::Failed { error, .. } => Err(SyncError::internal(error)),
            outcome => Ok(outcome),
        }
    }

    /// Apply one pulled record. Detail rows are written before the parent
    /// row that references them; on update the existing detail rows are
    /// rewritten in place so foreign keys stay stable.
    async fn apply_pull(
        &self,
        scope: SyncScope,
        kind: EntityKind,
        record: &ExternalRecord,
        mut write: LocalWrite,
    ) -> SyncResult<RecordOutcome> {
        let provider_kind = self.provider_kind();

        if let Some(parent_ref) = write.parent_ref.take() {
            let resolved = self
                .correlations
                .find_by_external(
                    scope.tenant_id,
                    parent_ref.kind,
                    provider_kind,
                    &parent_ref.external_id,
                )
                .await?;
            match resolved {
                Some(correlation) => {
                    write
                        .parent
                        .insert(parent_ref.column.into(), json!(correlation.local_id));
                }
                None => {
                    // The parent has not been pulled yet; leave the record
                    // for a later pass rather than fabricating the link.
                    warn!(
                        kind = %kind,
                        external_id = %record.id,
                        parent_kind = %parent_ref.kind,
                        parent_external_id = %parent_ref.external_id,
                        "Skipping record with unresolved parent reference"
                    );
                    return Ok(RecordOutcome::Skipped {
                        id: record.id.clone(),
                        reason: SyncError::missing_correlation(
                            parent_ref.kind,
                            parent_ref.external_id,
                        )
                        .to_string(),
                    });
                }
            }
        }

        let existing = self
            .correlations
            .find_by_external(scope.tenant_id, kind, provider_kind, &record.id)
            .await?;

        if let Some(correlation) = existing {
            let current = self
                .rows
                .select_one(
                    kind.table(),
                    &[Filter::uuid("id", correlation.local_id)],
                    &[],
                )
                .await?
                .ok_or_else(|| SyncError::entity_not_found(kind, correlation.local_id))?;

            let mut parent = write.parent;
            for detail in write.details {
                match row_uuid(&current, detail.spec.fk_column) {
                    Some(detail_id) => {
                        self.rows.update(detail.spec.table, detail_id, &detail.row).await?;
                    }
                    None => {
                        let detail_id = self.rows.insert(detail.spec.table, &detail.row).await?;
                        parent.insert(detail.spec.fk_column.into(), json!(detail_id));
                    }
                }
            }
            self.rows
                .update(kind.table(), correlation.local_id, &parent)
                .await?;
            return Ok(RecordOutcome::Updated {
                local_id: correlation.local_id,
                external_id: record.id.clone(),
            });
        }

        let mut parent = write.parent;
        for detail in write.details {
            let detail_id = self.rows.insert(detail.spec.table, &detail.row).await?;
            parent.insert(detail.spec.fk_column.into(), json!(detail_id));
        }
        parent.insert(kind.owner_column().into(), json!(scope.owner_id));

        let local_id = self.rows.insert(kind.table(), &parent).await?;
        self.correlations
            .upsert(&CorrelationRecord::new(
                scope.tenant_id,
                kind,
                provider_kind,
                local_id,
                &record.id,
            ))
            .await?;
        Ok(RecordOutcome::Created {
            local_id,
            external_id: record.id.clone(),
        })
    }

    /// Pull the provider's full record set of one kind into local rows.
    #[instrument(skip(self), fields(provider = %self.provider_kind(), kind = %kind, tenant = %scope.tenant_id))]
    pub async fn pull(&self, scope: SyncScope, kind: EntityKind) -> SyncResult<PassSummary> {
        let ctx = self.resolve_context(scope).await?;
        let records = self.provider.fetch_all(kind).await?;

        let mut summary = PassSummary::default();
        for record in &records {
            let write = match self.mappers.get(kind)?.to_local(record, &ctx) {
                Ok(write) => write,
                Err(e) => {
                    warn!(kind = %kind, external_id = %record.id, error = %e, "Inbound mapping failed");
                    summary.record(RecordOutcome::Failed {
                        id: record.id.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let outcome = self.apply_pull(scope, kind, record, write).await?;
            summary.record(outcome);
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "Pull pass complete"
        );
        Ok(summary)
    }

    /// Delete a local record and its external counterpart.
    ///
    /// The external delete runs first: if it fails the local row is left
    /// untouched and the correlation intact, so a retry sees the same
    /// state.
    #[instrument(skip(self), fields(provider = %self.provider_kind(), kind = %kind))]
    pub async fn delete_local(
        &self,
        scope: SyncScope,
        kind: EntityKind,
        local_id: Uuid,
    ) -> SyncResult<()> {
        let provider_kind = self.provider_kind();

        let row = self
            .rows
            .select_one(kind.table(), &[Filter::uuid("id", local_id)], &[])
            .await?
            .ok_or_else(|| SyncError::entity_not_found(kind, local_id))?;

        let correlation = self
            .correlations
            .find(scope.tenant_id, kind, provider_kind, local_id)
            .await?;
        if let Some(correlation) = &correlation {
            self.provider.delete(kind, &correlation.external_id).await?;
        }

        self.delete_local_rows(kind, local_id, &row).await?;
        if correlation.is_some() {
            self.correlations
                .delete(scope.tenant_id, kind, provider_kind, local_id)
                .await?;
        }
        info!(kind = %kind, local_id = %local_id, "Deleted record");
        Ok(())
    }

    /// Delete a parent row and the detail rows it references.
    pub(crate) async fn delete_local_rows(
        &self,
        kind: EntityKind,
        local_id: Uuid,
        row: &Value,
    ) -> SyncResult<()> {
        // Parent first: detail rows are referenced by the parent's
        // foreign keys.
        self.rows.delete(kind.table(), local_id).await?;
        for detail in kind.details() {
            if let Some(detail_id) = row_uuid(row, detail.fk_column) {
                self.rows.delete(detail.table, detail_id).await?;
            }
        }
        Ok(())
    }

}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("provider", &self.provider_kind())
            .finish()
    }
}
