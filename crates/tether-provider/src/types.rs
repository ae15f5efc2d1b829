//! Provider and entity type enums plus the external record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External CRM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Salesforce CRM.
    Salesforce,
    /// HubSpot CRM.
    Hubspot,
}

impl ProviderKind {
    /// Connection key used by the gateway and the connection registry.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Salesforce => "salesforce",
            ProviderKind::Hubspot => "hubspot",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "salesforce" => Ok(ProviderKind::Salesforce),
            "hubspot" => Ok(ProviderKind::Hubspot),
            _ => Err(format!("Unknown provider: {s}")),
        }
    }
}

/// Kind of business entity being synchronized.
///
/// Carries the fixed integer discriminator stored alongside each correlation
/// record; all entity kinds share one correlation table, so the discriminator
/// disambiguates id collisions across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Sales lead.
    Lead,
    /// Person attached to an account.
    Contact,
    /// Company/account.
    Account,
    /// Deal/opportunity.
    Deal,
}

impl EntityKind {
    /// All kinds, in the order pull passes must process them: accounts
    /// before contacts (contact mapping resolves company references through
    /// account correlations), then leads and deals.
    pub const DEPENDENCY_ORDER: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Contact,
        EntityKind::Lead,
        EntityKind::Deal,
    ];

    /// Stable integer discriminator stored in the correlation table.
    #[must_use]
    pub fn type_id(&self) -> i16 {
        match self {
            EntityKind::Lead => 0,
            EntityKind::Contact => 1,
            EntityKind::Account => 2,
            EntityKind::Deal => 3,
        }
    }

    /// Parse the stored discriminator back into a kind.
    #[must_use]
    pub fn from_type_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(EntityKind::Lead),
            1 => Some(EntityKind::Contact),
            2 => Some(EntityKind::Account),
            3 => Some(EntityKind::Deal),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Lead => "lead",
            EntityKind::Contact => "contact",
            EntityKind::Account => "account",
            EntityKind::Deal => "deal",
        }
    }

    /// Gateway action name for creating a record of this kind.
    ///
    /// The action names are irregular (`create-accounts` but `create-lead`);
    /// they mirror the actions configured on the gateway.
    #[must_use]
    pub fn create_action(&self) -> &'static str {
        match self {
            EntityKind::Lead => "create-lead",
            EntityKind::Contact => "create-contact",
            EntityKind::Account => "create-accounts",
            EntityKind::Deal => "create-deal",
        }
    }

    /// Gateway action name for updating a record of this kind.
    #[must_use]
    pub fn update_action(&self) -> &'static str {
        match self {
            EntityKind::Lead => "update-lead",
            EntityKind::Contact => "update-contacts",
            EntityKind::Account => "update-accounts",
            EntityKind::Deal => "update-deals",
        }
    }

    /// Gateway action name for deleting a record of this kind.
    #[must_use]
    pub fn delete_action(&self) -> &'static str {
        match self {
            EntityKind::Lead => "delete-leads",
            EntityKind::Contact => "delete-contacts",
            EntityKind::Account => "delete-accounts",
            EntityKind::Deal => "delete-deals",
        }
    }

    /// Gateway action name for fetching the full record set of this kind.
    #[must_use]
    pub fn fetch_action(&self) -> &'static str {
        match self {
            EntityKind::Lead => "get-leads",
            EntityKind::Contact => "get-contacts",
            EntityKind::Account => "get-all-accounts",
            EntityKind::Deal => "get-deals",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lead" => Ok(EntityKind::Lead),
            "contact" => Ok(EntityKind::Contact),
            "account" => Ok(EntityKind::Account),
            "deal" => Ok(EntityKind::Deal),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// A record as the provider returns it: a provider-assigned id, an opaque
/// field bag, and creation/update timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRecord {
    /// Provider-assigned record id.
    pub id: String,

    /// Display name, present for accounts and deals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Provider field bag. Field names are provider-specific.
    #[serde(default)]
    pub fields: serde_json::Value,

    /// When the provider created the record.
    #[serde(rename = "createdTime")]
    pub created_time: DateTime<Utc>,

    /// When the provider last updated the record.
    #[serde(rename = "updatedTime")]
    pub updated_time: DateTime<Utc>,
}

impl ExternalRecord {
    /// Look up a field in the field bag.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Look up a string field, treating JSON null as absent.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in [ProviderKind::Salesforce, ProviderKind::Hubspot] {
            let s = kind.as_str();
            let parsed: ProviderKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_entity_kind_type_ids() {
        assert_eq!(EntityKind::Lead.type_id(), 0);
        assert_eq!(EntityKind::Contact.type_id(), 1);
        assert_eq!(EntityKind::Account.type_id(), 2);
        assert_eq!(EntityKind::Deal.type_id(), 3);

        for kind in EntityKind::DEPENDENCY_ORDER {
            assert_eq!(EntityKind::from_type_id(kind.type_id()), Some(kind));
        }
        assert_eq!(EntityKind::from_type_id(7), None);
    }

    #[test]
    fn test_entity_kind_roundtrip() {
        for kind in EntityKind::DEPENDENCY_ORDER {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_dependency_order_accounts_before_contacts() {
        let order = EntityKind::DEPENDENCY_ORDER;
        let account_pos = order.iter().position(|k| *k == EntityKind::Account).unwrap();
        let contact_pos = order.iter().position(|k| *k == EntityKind::Contact).unwrap();
        assert!(account_pos < contact_pos);
    }

    #[test]
    fn test_external_record_deserialize() {
        let record: ExternalRecord = serde_json::from_value(serde_json::json!({
            "id": "001xx000003DGb2AAG",
            "name": "Acme",
            "fields": {"Industry": "Technology"},
            "createdTime": "2024-03-01T10:00:00Z",
            "updatedTime": "2024-03-02T11:30:00Z"
        }))
        .unwrap();

        assert_eq!(record.id, "001xx000003DGb2AAG");
        assert_eq!(record.name.as_deref(), Some("Acme"));
        assert_eq!(record.field_str("Industry"), Some("Technology"));
        assert!(record.updated_time > record.created_time);
    }
}
