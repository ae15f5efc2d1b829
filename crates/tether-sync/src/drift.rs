//! Drift detection between the correlation store and the provider.
//!
//! Drift shows up as two set differences over external ids: correlations
//! whose external record disappeared (orphaned) and external records no
//! correlation tracks (extraneous). Detection requires the untruncated
//! external record set, which is why fetches fail instead of returning a
//! partial page.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use tether_provider::{EntityKind, ProviderActions};

use crate::correlation::CorrelationStore;
use crate::entity::EntityTopology;
use crate::error::SyncResult;
use crate::scope::SyncScope;
use crate::store::{Filter, RowStore};

/// The two directions of drift for one entity kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DriftReport {
    /// External ids tracked by a correlation but no longer present at the
    /// provider. Their local rows are stale copies.
    pub orphaned: Vec<String>,
    /// External ids present at the provider but tracked by no
    /// correlation.
    pub extraneous: Vec<String>,
}

impl DriftReport {
    /// Compute drift from the tracked and observed external id sets.
    #[must_use]
    pub fn diff(tracked: &HashSet<String>, observed: &HashSet<String>) -> Self {
        let mut orphaned: Vec<String> = tracked.difference(observed).cloned().collect();
        let mut extraneous: Vec<String> = observed.difference(tracked).cloned().collect();
        orphaned.sort();
        extraneous.sort();
        Self {
            orphaned,
            extraneous,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orphaned.is_empty() && self.extraneous.is_empty()
    }
}

/// Result of applying a drift report.
#[derive(Debug, Default)]
pub struct DriftSummary {
    /// Local rows deleted over orphaned correlations.
    pub local_deleted: usize,
    /// External records deleted for lacking a correlation.
    pub external_deleted: usize,
    /// Deletions that failed and were left for the next pass.
    pub failed: usize,
}

/// Detects and remediates drift for one provider connection.
pub struct DriftDetector {
    provider: Arc<dyn ProviderActions>,
    correlations: Arc<dyn CorrelationStore>,
    rows: Arc<dyn RowStore>,
}

impl DriftDetector {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ProviderActions>,
        correlations: Arc<dyn CorrelationStore>,
        rows: Arc<dyn RowStore>,
    ) -> Self {
        Self {
            provider,
            correlations,
            rows,
        }
    }

    /// Detect drift for one kind without changing anything.
    #[instrument(skip(self), fields(provider = %self.provider.provider(), kind = %kind, tenant = %scope.tenant_id))]
    pub async fn detect(&self, scope: SyncScope, kind: EntityKind) -> SyncResult<DriftReport> {
        let tracked = self
            .correlations
            .tracked_external_ids(scope.tenant_id, kind, self.provider.provider())
            .await?;
        let observed: HashSet<String> = self
            .provider
            .fetch_all(kind)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let report = DriftReport::diff(&tracked, &observed);
        info!(
            tracked = tracked.len(),
            observed = observed.len(),
            orphaned = report.orphaned.len(),
            extraneous = report.extraneous.len(),
            "Drift detected"
        );
        Ok(report)
    }

    /// Detect and remediate drift for one kind: orphaned correlations
    /// lose their local rows, extraneous external records are deleted at
    /// the provider. Individual failures are counted and retried on the
    /// next pass.
    #[instrument(skip(self), fields(provider = %self.provider.provider(), kind = %kind, tenant = %scope.tenant_id))]
    pub async fn reconcile(&self, scope: SyncScope, kind: EntityKind) -> SyncResult<DriftSummary> {
        let report = self.detect(scope, kind).await?;
        let mut summary = DriftSummary::default();

        for external_id in &report.orphaned {
            match self.delete_orphaned(scope, kind, external_id).await {
                Ok(()) => summary.local_deleted += 1,
                Err(e) => {
                    warn!(kind = %kind, external_id = %external_id, error = %e, "Failed to remove orphaned record");
                    summary.failed += 1;
                }
            }
        }

        for external_id in &report.extraneous {
            match self.provider.delete(kind, external_id).await {
                Ok(()) => summary.external_deleted += 1,
                Err(e) => {
                    warn!(kind = %kind, external_id = %external_id, error = %e, "Failed to delete extraneous external record");
                    summary.failed += 1;
                }
            }
        }

        info!(
            local_deleted = summary.local_deleted,
            external_deleted = summary.external_deleted,
            failed = summary.failed,
            "Drift pass complete"
        );
        Ok(summary)
    }

    /// Remove the local row set behind an orphaned correlation.
    async fn delete_orphaned(
        &self,
        scope: SyncScope,
        kind: EntityKind,
        external_id: &str,
    ) -> SyncResult<()> {
        let provider_kind = self.provider.provider();
        let Some(correlation) = self
            .correlations
            .find_by_external(scope.tenant_id, kind, provider_kind, external_id)
            .await?
        else {
            return Ok(());
        };

        let row = self
            .rows
            .select_one(
                kind.table(),
                &[Filter::uuid("id", correlation.local_id)],
                &[],
            )
            .await?;

        if let Some(row) = row {
            self.rows.delete(kind.table(), correlation.local_id).await?;
            for detail in kind.details() {
                if let Some(detail_id) = detail_fk(&row, detail.fk_column) {
                    self.rows.delete(detail.table, detail_id).await?;
                }
            }
        }

        self.correlations
            .delete_by_external(scope.tenant_id, kind, provider_kind, external_id)
            .await?;
        Ok(())
    }
}

fn detail_fk(row: &serde_json::Value, column: &str) -> Option<Uuid> {
    row.get(column)
        .and_then(serde_json::Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

impl std::fmt::Debug for DriftDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftDetector")
            .field("provider", &self.provider.provider())
            .finish()
    }
}
