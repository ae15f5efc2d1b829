//! Sync job dispatch.
//!
//! A job names a provider, a direction, and the entity kinds to cover.
//! The runner fans out over every connection of that provider, and within
//! a connection over every user scope. Kinds always run in dependency
//! order regardless of how the job lists them, so contact passes see the
//! account correlations they resolve against.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tether_provider::{EntityKind, ProviderKind};

use crate::correlation::CorrelationStore;
use crate::drift::{DriftDetector, DriftSummary};
use crate::engine::{PassSummary, ReconciliationEngine};
use crate::error::{SyncError, SyncResult};
use crate::mapper::MapperRegistry;
use crate::mappers::{hubspot_registry, salesforce_registry};
use crate::scope::{ConnectionRegistry, ProviderClientFactory, ProviderConnection};
use crate::store::RowStore;

/// Direction of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Local records out to the provider.
    Push,
    /// Provider records in to local rows.
    Pull,
    /// Detect and remediate drift.
    Drift,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
            SyncDirection::Drift => "drift",
        };
        write!(f, "{s}")
    }
}

/// A unit of sync work across all connections of a provider.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub provider: ProviderKind,
    pub direction: SyncDirection,
    /// Kinds to cover. Empty means all kinds.
    pub kinds: Vec<EntityKind>,
}

impl SyncJob {
    #[must_use]
    pub fn new(provider: ProviderKind, direction: SyncDirection) -> Self {
        Self {
            provider,
            direction,
            kinds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Requested kinds in dependency order.
    #[must_use]
    pub fn ordered_kinds(&self) -> Vec<EntityKind> {
        if self.kinds.is_empty() {
            EntityKind::DEPENDENCY_ORDER.to_vec()
        } else {
            EntityKind::DEPENDENCY_ORDER
                .into_iter()
                .filter(|kind| self.kinds.contains(kind))
                .collect()
        }
    }
}

/// One pass within a connection report.
#[derive(Debug)]
pub enum PassReport {
    Push(EntityKind, PassSummary),
    Pull(EntityKind, PassSummary),
    Drift(EntityKind, DriftSummary),
}

/// Result of a job for one connection.
#[derive(Debug)]
pub struct ConnectionReport {
    pub connection_id: Uuid,
    pub tenant_id: Uuid,
    pub passes: Vec<PassReport>,
}

/// Aggregated result of a job.
#[derive(Debug, Default)]
pub struct JobReport {
    pub connections: Vec<ConnectionReport>,
    /// Connections that failed before producing a report.
    pub failed_connections: usize,
}

/// Runs sync jobs over every connection of a provider.
pub struct JobRunner {
    registry: Arc<dyn ConnectionRegistry>,
    factory: Arc<dyn ProviderClientFactory>,
    correlations: Arc<dyn CorrelationStore>,
    rows: Arc<dyn RowStore>,
    mappers: HashMap<ProviderKind, Arc<MapperRegistry>>,
}

impl JobRunner {
    /// Create a runner with the Salesforce and HubSpot mappers installed.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        factory: Arc<dyn ProviderClientFactory>,
        correlations: Arc<dyn CorrelationStore>,
        rows: Arc<dyn RowStore>,
    ) -> Self {
        let mut mappers = HashMap::new();
        mappers.insert(
            ProviderKind::Salesforce,
            Arc::new(salesforce_registry()),
        );
        mappers.insert(ProviderKind::Hubspot, Arc::new(hubspot_registry()));
        Self {
            registry,
            factory,
            correlations,
            rows,
            mappers,
        }
    }

    /// Install (or replace) the mapper registry for a provider.
    pub fn register_mappers(&mut self, registry: MapperRegistry) {
        self.mappers
            .insert(registry.provider(), Arc::new(registry));
    }

    /// Run a job across all connections of its provider. Connections run
    /// concurrently and fail independently.
    #[instrument(skip(self), fields(provider = %job.provider, direction = %job.direction))]
    pub async fn run(&self, job: &SyncJob) -> SyncResult<JobReport> {
        let connections = self.registry.connections(job.provider).await?;
        let kinds = job.ordered_kinds();
        info!(connections = connections.len(), "Dispatching sync job");

        let tasks = connections.into_iter().map(|connection| {
            let connection_id = connection.connection_id;
            let kinds = kinds.clone();
            async move {
                let result = self.run_connection(connection, &kinds, job.direction).await;
                (connection_id, result)
            }
        });

        let mut report = JobReport::default();
        for (connection_id, result) in join_all(tasks).await {
            match result {
                Ok(connection_report) => report.connections.push(connection_report),
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "Connection sync failed");
                    report.failed_connections += 1;
                }
            }
        }
        Ok(report)
    }

    async fn run_connection(
        &self,
        connection: ProviderConnection,
        kinds: &[EntityKind],
        direction: SyncDirection,
    ) -> SyncResult<ConnectionReport> {
        let client = self.factory.client(&connection)?;
        let mappers = self
            .mappers
            .get(&connection.provider)
            .cloned()
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "no mappers installed for provider {}",
                    connection.provider
                ))
            })?;

        // Kinds without a mapper for this provider are skipped, not
        // failed; HubSpot has no lead object.
        let kinds: Vec<EntityKind> = kinds
            .iter()
            .copied()
            .filter(|kind| mappers.supports(*kind))
            .collect();

        let engine = ReconciliationEngine::new(
            client.clone(),
            self.correlations.clone(),
            self.rows.clone(),
            mappers,
        );
        let drift = DriftDetector::new(client, self.correlations.clone(), self.rows.clone());

        let mut passes = Vec::new();
        for scope in connection.scopes() {
            for kind in &kinds {
                let pass = match direction {
                    SyncDirection::Push => {
                        PassReport::Push(*kind, engine.push(scope, *kind).await?)
                    }
                    SyncDirection::Pull => {
                        PassReport::Pull(*kind, engine.pull(scope, *kind).await?)
                    }
                    SyncDirection::Drift => {
                        PassReport::Drift(*kind, drift.reconcile(scope, *kind).await?)
                    }
                };
                passes.push(pass);
            }
        }

        Ok(ConnectionReport {
            connection_id: connection.connection_id,
            tenant_id: connection.tenant_id,
            passes,
        })
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("providers", &self.mappers.keys().collect::<Vec<_>>())
            .finish()
    }
}
