//! Field mapping between local rows and provider payloads.
//!
//! Mappers are pure: everything that needs a database or correlation
//! lookup (tenant defaults, the external id of a contact's account) is
//! resolved by the engine beforehand and handed in through [`MapContext`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use tether_provider::{EntityKind, ExternalRecord, ProviderKind};

use crate::entity::{DetailSpec, LocalEntity};
use crate::error::{SyncError, SyncResult};

/// Pre-resolved context for a mapping pass.
#[derive(Debug, Clone)]
pub struct MapContext {
    pub tenant_id: Uuid,
    /// Local user the pulled rows are attributed to.
    pub owner_id: Uuid,
    /// Tenant's default entity group, if configured.
    pub group_id: Option<Uuid>,
    /// First stage of the default group, if configured.
    pub stage_id: Option<Uuid>,
    /// First priority of the default group, if configured.
    pub priority_id: Option<Uuid>,
    /// External id of the record's parent, when the engine resolved one
    /// (the account id a pushed contact links to).
    pub parent_external_id: Option<String>,
}

impl MapContext {
    #[must_use]
    pub fn new(tenant_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            tenant_id,
            owner_id,
            group_id: None,
            stage_id: None,
            priority_id: None,
            parent_external_id: None,
        }
    }

    #[must_use]
    pub fn with_parent_external_id(mut self, external_id: Option<String>) -> Self {
        self.parent_external_id = external_id;
        self
    }
}

/// A detail row to write alongside a parent row.
#[derive(Debug, Clone)]
pub struct DetailWrite {
    pub spec: DetailSpec,
    pub row: Map<String, Value>,
}

/// A parent the pulled record references by external id. The engine
/// resolves it to a local id through the correlation store; a record
/// whose reference cannot be resolved is skipped.
#[derive(Debug, Clone)]
pub struct ParentRef {
    pub kind: EntityKind,
    /// Column on the parent row that holds the resolved local id.
    pub column: &'static str,
    pub external_id: String,
}

/// The local writes a pulled record maps to: detail rows first, then the
/// parent row referencing them.
#[derive(Debug, Clone, Default)]
pub struct LocalWrite {
    pub parent: Map<String, Value>,
    pub details: Vec<DetailWrite>,
    pub parent_ref: Option<ParentRef>,
}

impl LocalWrite {
    #[must_use]
    pub fn new(parent: Map<String, Value>) -> Self {
        Self {
            parent,
            details: Vec::new(),
            parent_ref: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, spec: DetailSpec, row: Map<String, Value>) -> Self {
        self.details.push(DetailWrite { spec, row });
        self
    }

    #[must_use]
    pub fn with_parent_ref(mut self, parent_ref: Option<ParentRef>) -> Self {
        self.parent_ref = parent_ref;
        self
    }
}

/// Bidirectional field mapping for one entity kind against one provider.
pub trait EntityMapper: Send + Sync {
    /// Entity kind this mapper handles.
    fn kind(&self) -> EntityKind;

    /// Map a local entity to the provider's action payload.
    fn to_external(&self, entity: &LocalEntity, ctx: &MapContext) -> SyncResult<Value>;

    /// Map a provider record to the local rows it should become.
    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite>;
}

/// Mapper lookup for one provider.
pub struct MapperRegistry {
    provider: ProviderKind,
    mappers: HashMap<EntityKind, Arc<dyn EntityMapper>>,
}

impl MapperRegistry {
    #[must_use]
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            mappers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn register(&mut self, mapper: Arc<dyn EntityMapper>) {
        self.mappers.insert(mapper.kind(), mapper);
    }

    /// Whether a mapper is installed for the kind. Providers without a
    /// counterpart object (HubSpot has no lead) simply skip that kind.
    #[must_use]
    pub fn supports(&self, kind: EntityKind) -> bool {
        self.mappers.contains_key(&kind)
    }

    pub fn get(&self, kind: EntityKind) -> SyncResult<&dyn EntityMapper> {
        self.mappers
            .get(&kind)
            .map(Arc::as_ref)
            .ok_or(SyncError::MapperNotFound { kind })
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("provider", &self.provider)
            .field("kinds", &self.mappers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Table;

    struct NoopMapper;

    impl EntityMapper for NoopMapper {
        fn kind(&self) -> EntityKind {
            EntityKind::Lead
        }

        fn to_external(&self, _entity: &LocalEntity, _ctx: &MapContext) -> SyncResult<Value> {
            Ok(Value::Null)
        }

        fn to_local(&self, _record: &ExternalRecord, _ctx: &MapContext) -> SyncResult<LocalWrite> {
            Ok(LocalWrite::default())
        }
    }

    #[test]
    fn test_registry_supports() {
        let mut registry = MapperRegistry::new(ProviderKind::Hubspot);
        registry.register(Arc::new(NoopMapper));
        assert!(registry.supports(EntityKind::Lead));
        assert!(!registry.supports(EntityKind::Account));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = MapperRegistry::new(ProviderKind::Salesforce);
        registry.register(Arc::new(NoopMapper));

        assert!(registry.get(EntityKind::Lead).is_ok());
        assert!(matches!(
            registry.get(EntityKind::Deal),
            Err(SyncError::MapperNotFound {
                kind: EntityKind::Deal
            })
        ));
    }

    #[test]
    fn test_local_write_builder() {
        let write = LocalWrite::new(Map::new())
            .with_detail(
                DetailSpec {
                    table: Table::PhoneBook,
                    fk_column: "phone_book_id",
                },
                Map::new(),
            )
            .with_parent_ref(Some(ParentRef {
                kind: EntityKind::Account,
                column: "account_id",
                external_id: "001".into(),
            }));

        assert_eq!(write.details.len(), 1);
        assert_eq!(write.parent_ref.as_ref().unwrap().column, "account_id");
    }
}
