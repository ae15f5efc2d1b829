//! Connection discovery and sync scoping.
//!
//! A sync pass runs per connection and per user: the connection supplies
//! the provider credentials for a tenant, the user scopes which local
//! rows are pushed and which user pulled rows are attributed to.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use tether_provider::{GatewayClient, GatewayConfig, ProviderActions, ProviderKind};

use crate::error::{SyncError, SyncResult};
use crate::store::{Filter, RowStore};
use crate::entity::Table;

/// The tenant/user pair a pass operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncScope {
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
}

impl SyncScope {
    #[must_use]
    pub fn new(tenant_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            tenant_id,
            owner_id,
        }
    }
}

/// A tenant's connection to a provider, with the users it covers.
#[derive(Debug, Clone)]
pub struct ProviderConnection {
    pub connection_id: Uuid,
    pub tenant_id: Uuid,
    pub provider: ProviderKind,
    pub access_token: String,
    /// Users of the tenant, each of which gets its own scoped pass.
    pub user_ids: Vec<Uuid>,
}

impl ProviderConnection {
    /// Scopes this connection fans out to, one per user.
    pub fn scopes(&self) -> impl Iterator<Item = SyncScope> + '_ {
        self.user_ids
            .iter()
            .map(|user_id| SyncScope::new(self.tenant_id, *user_id))
    }
}

/// Source of provider connections.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// All active connections for a provider, with users resolved.
    async fn connections(&self, provider: ProviderKind) -> SyncResult<Vec<ProviderConnection>>;
}

/// Registry reading `integration_connection` rows, resolving each
/// tenant's users through `user_role`.
pub struct RowConnectionRegistry {
    rows: Arc<dyn RowStore>,
}

impl RowConnectionRegistry {
    #[must_use]
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    fn parse_uuid(row: &Value, column: &str) -> SyncResult<Uuid> {
        let raw = row.get(column).and_then(Value::as_str).ok_or_else(|| {
            SyncError::internal(format!("connection row missing column {column}"))
        })?;
        Uuid::parse_str(raw)
            .map_err(|e| SyncError::internal(format!("invalid {column} in connection row: {e}")))
    }
}

#[async_trait]
impl ConnectionRegistry for RowConnectionRegistry {
    async fn connections(&self, provider: ProviderKind) -> SyncResult<Vec<ProviderConnection>> {
        let rows = self
            .rows
            .select(
                Table::IntegrationConnection,
                &[Filter::text("connection_key", provider.as_str())],
                &[],
            )
            .await?;

        let mut connections = Vec::with_capacity(rows.len());
        for row in rows {
            let connection_id = Self::parse_uuid(&row, "connection_id")?;
            let tenant_id = Self::parse_uuid(&row, "tenant_id")?;
            let access_token = row
                .get("connection_details")
                .and_then(|d| d.get("access_token"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SyncError::configuration(format!(
                        "connection {connection_id} has no access token"
                    ))
                })?
                .to_string();

            let user_rows = self
                .rows
                .select(
                    Table::UserRole,
                    &[Filter::uuid("tenant_id", tenant_id)],
                    &[],
                )
                .await?;
            let mut user_ids = Vec::with_capacity(user_rows.len());
            for user_row in &user_rows {
                user_ids.push(Self::parse_uuid(user_row, "user_id")?);
            }

            connections.push(ProviderConnection {
                connection_id,
                tenant_id,
                provider,
                access_token,
                user_ids,
            });
        }
        Ok(connections)
    }
}

/// Builds a provider client for a connection.
pub trait ProviderClientFactory: Send + Sync {
    fn client(&self, connection: &ProviderConnection) -> SyncResult<Arc<dyn ProviderActions>>;
}

/// Factory producing gateway clients bearing the connection's token.
#[derive(Debug, Clone, Default)]
pub struct GatewayClientFactory {
    base_url: Option<String>,
}

impl GatewayClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

impl ProviderClientFactory for GatewayClientFactory {
    fn client(&self, connection: &ProviderConnection) -> SyncResult<Arc<dyn ProviderActions>> {
        let mut config = GatewayConfig::new(connection.provider, &connection.access_token);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        let client = GatewayClient::new(config).map_err(SyncError::Provider)?;
        Ok(Arc::new(client))
    }
}
