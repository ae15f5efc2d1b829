//! Generic row access for entity and detail tables.
//!
//! The engine reads and writes parent/detail rows through [`RowStore`] so
//! reconciliation logic stays independent of the database. The Postgres
//! implementation builds its SQL from the closed [`Table`] enum and
//! validated column names, binding all values through sqlx parameters.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entity::{DetailSpec, Table};
use crate::error::{SyncError, SyncResult};

/// A bound filter value.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Uuid(Uuid),
    Text(String),
    Int(i64),
}

/// An equality predicate on a parent-table column.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: &'static str,
    pub value: FilterValue,
}

impl Filter {
    #[must_use]
    pub fn uuid(column: &'static str, value: Uuid) -> Self {
        Self {
            column,
            value: FilterValue::Uuid(value),
        }
    }

    #[must_use]
    pub fn text(column: &'static str, value: impl Into<String>) -> Self {
        Self {
            column,
            value: FilterValue::Text(value.into()),
        }
    }

    #[must_use]
    pub fn int(column: &'static str, value: i64) -> Self {
        Self {
            column,
            value: FilterValue::Int(value),
        }
    }
}

/// Row-level access to entity and detail tables.
///
/// Rows cross this boundary as JSON objects keyed by column name, with
/// embedded detail rows nested under their table name.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Select rows matching all filters, with the given detail tables
    /// join-embedded under their table names.
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        embed: &[DetailSpec],
    ) -> SyncResult<Vec<Value>>;

    /// Select at most one row.
    async fn select_one(
        &self,
        table: Table,
        filters: &[Filter],
        embed: &[DetailSpec],
    ) -> SyncResult<Option<Value>> {
        let mut rows = self.select(table, filters, embed).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Insert a row, returning its id. If the object carries no `id` key
    /// the store generates one.
    async fn insert(&self, table: Table, row: &Map<String, Value>) -> SyncResult<Uuid>;

    /// Update the columns present in `row` on the row with the given id.
    /// Returns the number of rows affected.
    async fn update(&self, table: Table, id: Uuid, row: &Map<String, Value>) -> SyncResult<u64>;

    /// Delete the row with the given id. Returns the number of rows
    /// affected.
    async fn delete(&self, table: Table, id: Uuid) -> SyncResult<u64>;
}

/// Postgres-backed [`RowStore`].
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Columns are only ever named by code, never by callers of the public
/// API, but every identifier that reaches a query is still checked.
fn validate_ident(ident: &str) -> SyncResult<()> {
    let ok = !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SyncError::internal(format!(
            "invalid identifier in query: {ident}"
        )))
    }
}

fn where_clause(filters: &[Filter], first_param: usize) -> SyncResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut clause = String::from(" WHERE ");
    for (i, filter) in filters.iter().enumerate() {
        validate_ident(filter.column)?;
        if i > 0 {
            clause.push_str(" AND ");
        }
        clause.push_str(&format!("t.{} = ${}", filter.column, first_param + i));
    }
    Ok(clause)
}

fn bind_filters<'q>(
    mut query: sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments>,
    filters: &'q [Filter],
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments> {
    for filter in filters {
        query = match &filter.value {
            FilterValue::Uuid(v) => query.bind(*v),
            FilterValue::Text(v) => query.bind(v.as_str()),
            FilterValue::Int(v) => query.bind(*v),
        };
    }
    query
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        embed: &[DetailSpec],
    ) -> SyncResult<Vec<Value>> {
        let mut select = String::from("to_jsonb(t.*)");
        let mut joins = String::new();
        for (i, detail) in embed.iter().enumerate() {
            validate_ident(detail.fk_column)?;
            select.push_str(&format!(
                " || jsonb_build_object('{name}', to_jsonb(d{i}.*))",
                name = detail.table.as_str(),
            ));
            joins.push_str(&format!(
                " LEFT JOIN {name} d{i} ON t.{fk} = d{i}.id",
                name = detail.table.as_str(),
                fk = detail.fk_column,
            ));
        }
        let sql = format!(
            "SELECT {select} FROM {table} t{joins}{where_clause}",
            table = table.as_str(),
            where_clause = where_clause(filters, 1)?,
        );

        let query = bind_filters(sqlx::query_scalar::<_, Value>(&sql), filters);
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: &Map<String, Value>) -> SyncResult<Uuid> {
        let id = match row.get("id").and_then(Value::as_str) {
            Some(raw) => Uuid::parse_str(raw)
                .map_err(|e| SyncError::internal(format!("invalid row id: {e}")))?,
            None => Uuid::new_v4(),
        };
        let mut row = row.clone();
        row.insert("id".into(), Value::String(id.to_string()));

        let mut columns = Vec::with_capacity(row.len());
        for key in row.keys() {
            validate_ident(key)?;
            columns.push(key.as_str());
        }
        let column_list = columns.join(", ");
        let value_list = columns
            .iter()
            .map(|c| format!("r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({column_list}) \
             SELECT {value_list} FROM jsonb_populate_record(NULL::{table}, $1) r",
            table = table.as_str(),
        );

        sqlx::query(&sql)
            .bind(Value::Object(row))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn update(&self, table: Table, id: Uuid, row: &Map<String, Value>) -> SyncResult<u64> {
        if row.is_empty() {
            return Ok(0);
        }
        let mut assignments = Vec::with_capacity(row.len());
        for key in row.keys() {
            validate_ident(key)?;
            if key != "id" {
                assignments.push(format!("{key} = r.{key}"));
            }
        }
        if assignments.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {table} t SET {assignments} \
             FROM jsonb_populate_record(NULL::{table}, $2) r WHERE t.id = $1",
            table = table.as_str(),
            assignments = assignments.join(", "),
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Value::Object(row.clone()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: Table, id: Uuid) -> SyncResult<u64> {
        let sql = format!("DELETE FROM {table} WHERE id = $1", table = table.as_str());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
