//! Bidirectional CRM reconciliation.
//!
//! Local business entities (accounts, contacts, leads, deals) are kept in
//! step with an external CRM reached through an integration gateway.
//! Pushing maps local rows to provider payloads, pulling maps provider
//! records to local rows, and drift detection removes what one side
//! deleted. The correlation store ties the two id spaces together and is
//! the single source of pairing truth.

pub mod correlation;
pub mod drift;
pub mod engine;
pub mod entity;
pub mod error;
pub mod job;
pub mod mapper;
pub mod mappers;
pub mod scope;
pub mod store;

pub use correlation::{CorrelationRecord, CorrelationStore, PgCorrelationStore};
pub use drift::{DriftDetector, DriftReport, DriftSummary};
pub use engine::{PassSummary, ReconciliationEngine, RecordOutcome};
pub use entity::{DetailSpec, EntityTopology, LocalEntity, Table};
pub use error::{SyncError, SyncResult};
pub use job::{JobReport, JobRunner, SyncDirection, SyncJob};
pub use mapper::{EntityMapper, LocalWrite, MapContext, MapperRegistry, ParentRef};
pub use scope::{
    ConnectionRegistry, GatewayClientFactory, ProviderClientFactory, ProviderConnection,
    RowConnectionRegistry, SyncScope,
};
pub use store::{Filter, PgRowStore, RowStore};
