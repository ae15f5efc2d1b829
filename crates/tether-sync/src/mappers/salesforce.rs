//! Salesforce field mappings.
//!
//! Payload shapes follow the gateway's Salesforce action schemas: people
//! records use the unified `firstName`/`primaryEmail`/`primaryAddress`
//! shape, deals use `amount`/`probability`/`closeTime`. Inbound records
//! carry the same field names in their field bag.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use tether_provider::{EntityKind, ExternalRecord, ProviderKind};

use crate::entity::{DetailSpec, LocalEntity, PhoneBook, Table};
use crate::error::SyncResult;
use crate::mapper::{EntityMapper, LocalWrite, MapContext, MapperRegistry, ParentRef};

const PHONE_BOOK: DetailSpec = DetailSpec {
    table: Table::PhoneBook,
    fk_column: "phone_book_id",
};
const SOURCE: DetailSpec = DetailSpec {
    table: Table::DealLeadSource,
    fk_column: "source_id",
};

/// Registry with all four Salesforce mappers installed.
#[must_use]
pub fn salesforce_registry() -> MapperRegistry {
    let mut registry = MapperRegistry::new(ProviderKind::Salesforce);
    registry.register(Arc::new(SfAccountMapper));
    registry.register(Arc::new(SfContactMapper));
    registry.register(Arc::new(SfLeadMapper));
    registry.register(Arc::new(SfDealMapper));
    registry
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn full_name(pb: &PhoneBook) -> Option<String> {
    let joined = format!(
        "{} {}",
        pb.first_name.as_deref().unwrap_or(""),
        pb.last_name.as_deref().unwrap_or("")
    );
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn address_field<'a>(record: &'a ExternalRecord, key: &str) -> Option<&'a str> {
    record
        .field("primaryAddress")
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
}

fn person_payload(pb: &PhoneBook) -> Value {
    json!({
        "fullName": full_name(pb),
        "firstName": pb.first_name,
        "lastName": pb.last_name,
        "primaryEmail": pb.email,
        "emails": [{"value": pb.email}],
        "primaryPhone": pb.phone,
        "primaryAddress": {
            "street": pb.street,
            "city": pb.city,
            "state": pb.state,
            "country": pb.country,
        },
        "companyName": pb.company,
        "jobTitle": pb.title,
    })
}

fn person_rows(record: &ExternalRecord, ctx: &MapContext) -> (Map<String, Value>, Map<String, Value>) {
    let phone_book = object(json!({
        "first_name": record.field("firstName"),
        "last_name": record.field("lastName"),
        "email": record.field("primaryEmail"),
        "phone": record.field("primaryPhone"),
        "street": address_field(record, "street"),
        "city": address_field(record, "city"),
        "state": address_field(record, "state"),
        "country": address_field(record, "country"),
        "company": record.field("companyName"),
        "title": record.field("jobTitle"),
        "location": address_field(record, "city"),
    }));
    let parent = object(json!({
        "group_id": ctx.group_id,
        "entity_stage_id": ctx.stage_id,
        "entity_priority_id": ctx.priority_id,
        "created_by": ctx.owner_id,
    }));
    (phone_book, parent)
}

/// Account <-> Salesforce company.
pub struct SfAccountMapper;

impl EntityMapper for SfAccountMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Account
    }

    fn to_external(&self, entity: &LocalEntity, _ctx: &MapContext) -> SyncResult<Value> {
        let account = entity.as_account()?;
        let pb = &account.phone_book;
        Ok(json!({
            "name": pb.company,
            "domain": account.domain,
            "phone_book": {
                "first_name": pb.first_name,
                "email": pb.email,
                "phone": pb.phone,
                "website": pb.website,
                "street": pb.street,
                "city": pb.city,
                "state": pb.state,
                "country": pb.country,
                "description": pb.description,
                "do_not_call": pb.do_not_call,
            },
            "description": pb.description,
            "industry": account.industry,
            "no_of_employees": account.no_of_employees,
        }))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let phone_book = object(json!({
            "company": record.name,
            "website": record.field("Website"),
            "phone": record.field("Phone"),
        }));
        let parent = object(json!({
            "domain": record.field("Website"),
            "industry": record.field("Industry"),
            "no_of_employees": record.field("NumberOfEmployees"),
            "group_id": ctx.group_id,
            "entity_stage_id": ctx.stage_id,
            "entity_priority_id": ctx.priority_id,
            "created_by": ctx.owner_id,
        }));
        Ok(LocalWrite::new(parent).with_detail(PHONE_BOOK, phone_book))
    }
}

/// Contact <-> Salesforce contact. Pushed contacts carry the external id
/// of their account in `companyId`; pulled contacts hand the reference
/// back to the engine for correlation lookup.
pub struct SfContactMapper;

impl EntityMapper for SfContactMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Contact
    }

    fn to_external(&self, entity: &LocalEntity, ctx: &MapContext) -> SyncResult<Value> {
        let contact = entity.as_contact()?;
        let mut payload = object(person_payload(&contact.phone_book));
        payload.insert(
            "department".into(),
            json!(contact.phone_book.department),
        );
        payload.insert("companyId".into(), json!(ctx.parent_external_id));
        Ok(Value::Object(payload))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let (mut phone_book, parent) = person_rows(record, ctx);
        phone_book.insert("department".into(), json!(record.field("department")));
        phone_book.insert("created_by".into(), json!(ctx.owner_id));

        let parent_ref = record.field_str("companyId").map(|id| ParentRef {
            kind: EntityKind::Account,
            column: "account_id",
            external_id: id.to_string(),
        });

        Ok(LocalWrite::new(parent)
            .with_detail(PHONE_BOOK, phone_book)
            .with_parent_ref(parent_ref))
    }
}

/// Lead <-> Salesforce lead.
pub struct SfLeadMapper;

impl EntityMapper for SfLeadMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Lead
    }

    fn to_external(&self, entity: &LocalEntity, _ctx: &MapContext) -> SyncResult<Value> {
        let lead = entity.as_lead()?;
        let mut payload = object(person_payload(&lead.phone_book));
        payload.remove("emails");
        payload.insert(
            "source".into(),
            json!(lead.deal_lead_source.as_ref().and_then(|s| s.name.as_deref())),
        );
        Ok(Value::Object(payload))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let (phone_book, parent) = person_rows(record, ctx);
        let mut write = LocalWrite::new(parent).with_detail(PHONE_BOOK, phone_book);
        if let Some(source) = record.field_str("source") {
            write = write.with_detail(SOURCE, object(json!({"name": source})));
        }
        Ok(write)
    }
}

/// Deal <-> Salesforce opportunity.
pub struct SfDealMapper;

impl EntityMapper for SfDealMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Deal
    }

    fn to_external(&self, entity: &LocalEntity, _ctx: &MapContext) -> SyncResult<Value> {
        let deal = entity.as_deal()?;
        Ok(json!({
            "name": deal.name,
            "amount": deal.revenue,
            "currency": deal.currency,
            "source": deal.deal_lead_source.as_ref().and_then(|s| s.name.as_deref()),
            "stage": deal.entity_stage.as_ref().and_then(|s| s.name.as_deref()),
            "probability": deal.score.map(|s| s.to_string()),
            "closeTime": deal.close_date.map(|d| d.format("%Y-%m-%d").to_string()),
        }))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let score = record
            .field("probability")
            .and_then(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            });
        let parent = object(json!({
            "name": record.name,
            "revenue": record.field("amount"),
            "currency": record.field("currency"),
            "score": score,
            "close_date": record.field("closeTime"),
            "group_id": ctx.group_id,
            "entity_stage_id": ctx.stage_id,
            "created_by": ctx.owner_id,
        }));
        let source = object(json!({
            "name": record.field_str("source").unwrap_or_default(),
        }));
        Ok(LocalWrite::new(parent).with_detail(SOURCE, source))
    }
}
