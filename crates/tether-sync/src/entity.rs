//! Local entity model and table topology.
//!
//! Business entities live as rows in a parent table plus auxiliary detail
//! rows referenced by foreign key (a contact's person data sits in
//! `phone_book`, a lead's origin in `deal_lead_source`). The topology here
//! is the single description of that shape; the engine derives insert and
//! update ordering from it instead of repeating it per kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use tether_provider::EntityKind;

use crate::error::{SyncError, SyncResult};

/// Closed set of tables the engine touches. SQL identifiers only ever come
/// from this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Lead,
    Contact,
    Account,
    Deal,
    PhoneBook,
    DealLeadSource,
    EntityGroup,
    EntityStage,
    EntityPriority,
    EntityCorrelation,
    IntegrationConnection,
    UserRole,
}

impl Table {
    /// The table's SQL name, which is also the embed key used when detail
    /// rows are join-fetched into a parent row.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Lead => "lead",
            Table::Contact => "contact",
            Table::Account => "account",
            Table::Deal => "deal",
            Table::PhoneBook => "phone_book",
            Table::DealLeadSource => "deal_lead_source",
            Table::EntityGroup => "entity_group",
            Table::EntityStage => "entity_stage",
            Table::EntityPriority => "entity_priority",
            Table::EntityCorrelation => "entity_correlation",
            Table::IntegrationConnection => "integration_connection",
            Table::UserRole => "user_role",
        }
    }

    /// Foreign-key column a parent row uses to reference this table.
    #[must_use]
    pub fn fk_column(&self) -> &'static str {
        match self {
            Table::PhoneBook => "phone_book_id",
            Table::DealLeadSource => "source_id",
            Table::EntityStage => "entity_stage_id",
            Table::Account => "account_id",
            _ => "id",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detail table owned by a parent entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailSpec {
    /// Detail table.
    pub table: Table,
    /// Column on the parent row that references the detail row.
    pub fk_column: &'static str,
}

/// Table topology for an entity kind.
pub trait EntityTopology {
    /// Parent table for this kind.
    fn table(&self) -> Table;

    /// Detail tables, in the order rows must be written (details always
    /// before the parent that references them).
    fn details(&self) -> &'static [DetailSpec];

    /// Column scoping parent rows to the user that owns them.
    fn owner_column(&self) -> &'static str;

    /// Tables to join-embed when loading rows for mapping. This is the
    /// owned detail tables plus any lookup rows the outbound mapping
    /// reads (a deal's stage name comes from `entity_stage`).
    fn embeds(&self) -> &'static [DetailSpec] {
        self.details()
    }
}

const PHONE_BOOK: DetailSpec = DetailSpec {
    table: Table::PhoneBook,
    fk_column: "phone_book_id",
};
const SOURCE: DetailSpec = DetailSpec {
    table: Table::DealLeadSource,
    fk_column: "source_id",
};
const STAGE: DetailSpec = DetailSpec {
    table: Table::EntityStage,
    fk_column: "entity_stage_id",
};

impl EntityTopology for EntityKind {
    fn table(&self) -> Table {
        match self {
            EntityKind::Lead => Table::Lead,
            EntityKind::Contact => Table::Contact,
            EntityKind::Account => Table::Account,
            EntityKind::Deal => Table::Deal,
        }
    }

    fn details(&self) -> &'static [DetailSpec] {
        match self {
            EntityKind::Account | EntityKind::Contact => &[PHONE_BOOK],
            EntityKind::Lead => &[PHONE_BOOK, SOURCE],
            EntityKind::Deal => &[SOURCE],
        }
    }

    fn owner_column(&self) -> &'static str {
        match self {
            EntityKind::Contact => "created_by",
            _ => "owner_id",
        }
    }

    fn embeds(&self) -> &'static [DetailSpec] {
        match self {
            EntityKind::Deal => &[SOURCE, STAGE],
            other => other.details(),
        }
    }
}

/// Join-embedded detail rows come back as JSON null when the foreign key
/// is unset, so embedded fields treat null as absent.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value = Option::<T>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

/// Person/company detail row (`phone_book` table).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhoneBook {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub do_not_call: Option<bool>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Lead/deal origin detail row (`deal_lead_source` table).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Named reference row, used for embedded stage lookups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: Option<String>,
}

/// Account row with embedded detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub no_of_employees: Option<i64>,
    #[serde(default)]
    pub annual_revenue: Option<f64>,
    #[serde(default, deserialize_with = "null_default")]
    pub phone_book: PhoneBook,
}

/// Contact row with embedded detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    /// Owning account (local id).
    #[serde(default)]
    pub account_id: Option<Uuid>,
    #[serde(default)]
    pub phone_book_id: Option<Uuid>,
    #[serde(default, deserialize_with = "null_default")]
    pub phone_book: PhoneBook,
}

/// Lead row with embedded details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    #[serde(default)]
    pub phone_book_id: Option<Uuid>,
    #[serde(default)]
    pub source_id: Option<Uuid>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default, deserialize_with = "null_default")]
    pub phone_book: PhoneBook,
    #[serde(default)]
    pub deal_lead_source: Option<Source>,
}

/// Deal row with embedded details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_id: Option<Uuid>,
    #[serde(default)]
    pub deal_lead_source: Option<Source>,
    #[serde(default)]
    pub entity_stage: Option<NamedRef>,
}

/// A locally-owned business entity, as loaded from the row store with its
/// detail rows embedded.
#[derive(Debug, Clone)]
pub enum LocalEntity {
    Account(Account),
    Contact(Contact),
    Lead(Lead),
    Deal(Deal),
}

impl LocalEntity {
    /// Deserialize a row (with embedded details) into a typed entity.
    pub fn from_row(kind: EntityKind, row: serde_json::Value) -> SyncResult<Self> {
        let entity = match kind {
            EntityKind::Account => LocalEntity::Account(serde_json::from_value(row)?),
            EntityKind::Contact => LocalEntity::Contact(serde_json::from_value(row)?),
            EntityKind::Lead => LocalEntity::Lead(serde_json::from_value(row)?),
            EntityKind::Deal => LocalEntity::Deal(serde_json::from_value(row)?),
        };
        Ok(entity)
    }

    /// The entity's kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            LocalEntity::Account(_) => EntityKind::Account,
            LocalEntity::Contact(_) => EntityKind::Contact,
            LocalEntity::Lead(_) => EntityKind::Lead,
            LocalEntity::Deal(_) => EntityKind::Deal,
        }
    }

    /// The entity's local id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            LocalEntity::Account(a) => a.id,
            LocalEntity::Contact(c) => c.id,
            LocalEntity::Lead(l) => l.id,
            LocalEntity::Deal(d) => d.id,
        }
    }

    /// Unwrap as an account.
    pub fn as_account(&self) -> SyncResult<&Account> {
        match self {
            LocalEntity::Account(a) => Ok(a),
            other => Err(SyncError::mapping(
                other.kind(),
                "expected an account entity",
            )),
        }
    }

    /// Unwrap as a contact.
    pub fn as_contact(&self) -> SyncResult<&Contact> {
        match self {
            LocalEntity::Contact(c) => Ok(c),
            other => Err(SyncError::mapping(other.kind(), "expected a contact entity")),
        }
    }

    /// Unwrap as a lead.
    pub fn as_lead(&self) -> SyncResult<&Lead> {
        match self {
            LocalEntity::Lead(l) => Ok(l),
            other => Err(SyncError::mapping(other.kind(), "expected a lead entity")),
        }
    }

    /// Unwrap as a deal.
    pub fn as_deal(&self) -> SyncResult<&Deal> {
        match self {
            LocalEntity::Deal(d) => Ok(d),
            other => Err(SyncError::mapping(other.kind(), "expected a deal entity")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topology_details_ordering() {
        // Leads write phone_book then deal_lead_source, both before the
        // parent lead row.
        let details = EntityKind::Lead.details();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].table, Table::PhoneBook);
        assert_eq!(details[1].table, Table::DealLeadSource);

        assert_eq!(EntityKind::Deal.details(), &[SOURCE]);
        assert_eq!(EntityKind::Account.details(), &[PHONE_BOOK]);
    }

    #[test]
    fn test_owner_columns() {
        assert_eq!(EntityKind::Contact.owner_column(), "created_by");
        assert_eq!(EntityKind::Account.owner_column(), "owner_id");
        assert_eq!(EntityKind::Lead.owner_column(), "owner_id");
    }

    #[test]
    fn test_local_entity_from_row() {
        let id = Uuid::new_v4();
        let row = json!({
            "id": id,
            "domain": "acme.com",
            "industry": "Technology",
            "no_of_employees": 250,
            "phone_book": {"email": "info@acme.com", "country": "US"}
        });

        let entity = LocalEntity::from_row(EntityKind::Account, row).unwrap();
        assert_eq!(entity.kind(), EntityKind::Account);
        assert_eq!(entity.id(), id);

        let account = entity.as_account().unwrap();
        assert_eq!(account.domain.as_deref(), Some("acme.com"));
        assert_eq!(account.phone_book.email.as_deref(), Some("info@acme.com"));
    }

    #[test]
    fn test_local_entity_wrong_kind() {
        let row = json!({"id": Uuid::new_v4(), "phone_book": {}});
        let entity = LocalEntity::from_row(EntityKind::Contact, row).unwrap();
        assert!(entity.as_deal().is_err());
    }

    #[test]
    fn test_contact_embedded_account_link() {
        let account_id = Uuid::new_v4();
        let row = json!({
            "id": Uuid::new_v4(),
            "account_id": account_id,
            "phone_book": {"first_name": "Ada", "last_name": "Lovelace"}
        });
        let contact = LocalEntity::from_row(EntityKind::Contact, row).unwrap();
        assert_eq!(contact.as_contact().unwrap().account_id, Some(account_id));
    }
}
