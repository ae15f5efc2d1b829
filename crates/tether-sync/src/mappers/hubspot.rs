//! HubSpot field mappings.
//!
//! HubSpot shares the gateway's unified person shape for contacts but
//! keeps its own property names elsewhere: account records expose flat
//! `domain`/`numberofemployees`/`annualrevenue` fields, deals use
//! `closedate`/`hs_deal_stage_probability`/`hs_analytics_source`, and
//! probability travels as a 0..1 fraction rather than a percentage.
//! There is no lead object; lead passes are skipped for this provider.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use tether_provider::{EntityKind, ExternalRecord, ProviderKind};

use crate::entity::{DetailSpec, LocalEntity, Table};
use crate::error::SyncResult;
use crate::mapper::{EntityMapper, LocalWrite, MapContext, MapperRegistry};

const PHONE_BOOK: DetailSpec = DetailSpec {
    table: Table::PhoneBook,
    fk_column: "phone_book_id",
};
const SOURCE: DetailSpec = DetailSpec {
    table: Table::DealLeadSource,
    fk_column: "source_id",
};

/// Registry with the three HubSpot mappers installed.
#[must_use]
pub fn hubspot_registry() -> MapperRegistry {
    let mut registry = MapperRegistry::new(ProviderKind::Hubspot);
    registry.register(Arc::new(HsAccountMapper));
    registry.register(Arc::new(HsContactMapper));
    registry.register(Arc::new(HsDealMapper));
    registry
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn address_field<'a>(record: &'a ExternalRecord, key: &str) -> Option<&'a str> {
    record
        .field("primaryAddress")
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
}

/// Account <-> HubSpot company.
pub struct HsAccountMapper;

impl EntityMapper for HsAccountMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Account
    }

    fn to_external(&self, entity: &LocalEntity, _ctx: &MapContext) -> SyncResult<Value> {
        let account = entity.as_account()?;
        let pb = &account.phone_book;
        Ok(json!({
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
            "annual_revenue": account.annual_revenue,
        }))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let phone_book = object(json!({
            "first_name": record.field("name"),
            "phone": record.field("phone"),
            "website": record.field("website"),
            "street": record.field("address"),
            "city": record.field("city"),
            "state": record.field("state"),
            "country": record.field("country"),
            "description": record.field("description"),
            "company": record.field("industry"),
            "location": record.field("city"),
        }));
        let parent = object(json!({
            "domain": record.field("domain"),
            "industry": record.field("industry"),
            "no_of_employees": record.field("numberofemployees"),
            "annual_revenue": record.field("annualrevenue"),
            "group_id": ctx.group_id,
            "entity_stage_id": ctx.stage_id,
            "entity_priority_id": ctx.priority_id,
            "created_by": ctx.owner_id,
        }));
        Ok(LocalWrite::new(parent).with_detail(PHONE_BOOK, phone_book))
    }
}

/// Contact <-> HubSpot contact. Pushed contacts carry the external id of
/// their account in `companyId`; pulled HubSpot contacts carry no company
/// reference.
pub struct HsContactMapper;

impl EntityMapper for HsContactMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Contact
    }

    fn to_external(&self, entity: &LocalEntity, ctx: &MapContext) -> SyncResult<Value> {
        let contact = entity.as_contact()?;
        let pb = &contact.phone_book;
        let full = format!(
            "{} {}",
            pb.first_name.as_deref().unwrap_or(""),
            pb.last_name.as_deref().unwrap_or("")
        );
        Ok(json!({
            "fullName": full.trim(),
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
            "department": pb.department,
            "companyName": pb.company,
            "jobTitle": pb.title,
            "companyId": ctx.parent_external_id,
        }))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let phone_book = object(json!({
            "first_name": record.field("firstName"),
            "last_name": record.field("lastName"),
            "email": record.field("primaryEmail"),
            "phone": record.field("primaryPhone"),
            "street": address_field(record, "street"),
            "city": address_field(record, "city"),
            "state": address_field(record, "state"),
            "country": address_field(record, "country"),
            "title": record.field("jobTitle"),
            "location": address_field(record, "city"),
            "created_by": ctx.owner_id,
        }));
        let parent = object(json!({
            "group_id": ctx.group_id,
            "entity_stage_id": ctx.stage_id,
            "entity_priority_id": ctx.priority_id,
            "created_by": ctx.owner_id,
        }));
        Ok(LocalWrite::new(parent).with_detail(PHONE_BOOK, phone_book))
    }
}

/// Deal <-> HubSpot deal.
pub struct HsDealMapper;

impl EntityMapper for HsDealMapper {
    fn kind(&self) -> EntityKind {
        EntityKind::Deal
    }

    fn to_external(&self, entity: &LocalEntity, _ctx: &MapContext) -> SyncResult<Value> {
        let deal = entity.as_deal()?;
        // HubSpot takes probability as a 0..1 fraction; local scores are
        // percentages.
        let probability = deal.score.map_or(0.0, |s| {
            let p = s as f64;
            if p > 1.0 {
                p / 100.0
            } else {
                p
            }
        });
        Ok(json!({
            "name": deal.name,
            "amount": deal.revenue,
            "currency": deal.currency,
            "source": deal.deal_lead_source.as_ref().and_then(|s| s.name.as_deref()),
            "stage": deal.entity_stage.as_ref().and_then(|s| s.name.as_deref()),
            "probability": probability,
            "closeTime": deal.close_date.map(|d| d.format("%Y-%m-%d").to_string()),
        }))
    }

    fn to_local(&self, record: &ExternalRecord, ctx: &MapContext) -> SyncResult<LocalWrite> {
        let score = record
            .field("hs_deal_stage_probability")
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .map(|p| {
                let scaled = if p <= 1.0 { p * 100.0 } else { p };
                scaled.round() as i64
            });
        let parent = object(json!({
            "name": record.name,
            "revenue": record.field("amount"),
            "score": score,
            "close_date": record.field("closedate"),
            "group_id": ctx.group_id,
            "entity_stage_id": ctx.stage_id,
            "created_by": ctx.owner_id,
        }));
        let source = object(json!({
            "name": record.field_str("hs_analytics_source").unwrap_or_default(),
        }));
        Ok(LocalWrite::new(parent).with_detail(SOURCE, source))
    }
}
