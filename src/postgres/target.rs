// ABOUTME: PgTarget writes transformed records into PostgreSQL and stores sync cursors
// ABOUTME: Builds INSERT ... ON CONFLICT statements chunked under the bind-parameter limit

use crate::sync::cursor::{CursorStore, CURSOR_TABLE};
use crate::sync::mapping::{DestinationTable, FieldType, Record, TableMapping};
use crate::sync::transform::parse_iso_datetime;
use crate::sync::value::Value;
use crate::sync::writer::Destination;
use crate::utils::quote_ident;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// PostgreSQL allows 65535 bind parameters per statement; keep a margin.
const MAX_PARAMS: usize = 65_000;

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Destination and cursor store backed by a single connection, so cursor writes join the
/// table's transaction.
pub struct PgTarget {
    client: Client,
    cursor_table_ready: bool,
}

impl PgTarget {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cursor_table_ready: false,
        }
    }

    pub async fn connect(url: &str, max_retries: u32, retry_delay: Duration) -> Result<Self> {
        let client = super::connect_with_retry(url, max_retries, retry_delay).await?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Create the cursor table if needed.
    pub async fn ensure_cursor_table(&mut self) -> Result<()> {
        if self.cursor_table_ready {
            return Ok(());
        }
        self.client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    table_name TEXT PRIMARY KEY,
                    last_synced_at TIMESTAMP
                )",
                quote_ident(CURSOR_TABLE)
            ))
            .await
            .context("Failed to create sync cursor table")?;
        self.cursor_table_ready = true;
        Ok(())
    }

    async fn write(
        &mut self,
        mapping: &TableMapping,
        records: &[Record],
        conflict: Conflict,
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let destination = mapping.destination();
        let columns = mapping.write_columns();
        let types = columns
            .iter()
            .map(|c| {
                destination
                    .field(c)
                    .map(|f| f.field_type)
                    .ok_or_else(|| anyhow!("Column {} is not declared on {}", c, destination.qualified_name()))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows_per_statement = std::cmp::max(1, MAX_PARAMS / columns.len());
        let mut affected = 0u64;

        for chunk in records.chunks(rows_per_statement) {
            let query = match conflict {
                Conflict::Update => build_upsert_query(
                    destination,
                    columns,
                    mapping.key_columns(),
                    mapping.update_columns(),
                    chunk.len(),
                ),
                Conflict::Fail => build_insert_query(destination, columns, chunk.len()),
            };

            let mut params: Vec<SqlParam> = Vec::with_capacity(chunk.len() * columns.len());
            for record in chunk {
                for ((value, field_type), column) in record.values().iter().zip(&types).zip(columns) {
                    let param = value_to_sql(value, *field_type).with_context(|| {
                        format!(
                            "Cannot bind {} to {}.{}",
                            value.kind(),
                            destination.qualified_name(),
                            column
                        )
                    })?;
                    params.push(param);
                }
            }
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();

            affected += self
                .client
                .execute(query.as_str(), &refs)
                .await
                .with_context(|| format!("Failed to write batch into {}", destination.qualified_name()))?;
        }

        Ok(affected)
    }
}

#[derive(Debug, Clone, Copy)]
enum Conflict {
    Update,
    Fail,
}

#[async_trait]
impl Destination for PgTarget {
    async fn begin(&mut self) -> Result<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .context("Failed to begin transaction")
    }

    async fn commit(&mut self) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .context("Failed to commit transaction")
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .context("Failed to roll back transaction")
    }

    async fn truncate(&mut self, mapping: &TableMapping) -> Result<()> {
        let table = mapping.destination();
        self.client
            .batch_execute(&format!("TRUNCATE TABLE {}", qualified(table)))
            .await
            .with_context(|| format!("Failed to truncate {}", table.qualified_name()))
    }

    async fn insert(&mut self, mapping: &TableMapping, records: &[Record]) -> Result<u64> {
        self.write(mapping, records, Conflict::Fail).await
    }

    async fn upsert(&mut self, mapping: &TableMapping, records: &[Record]) -> Result<u64> {
        self.write(mapping, records, Conflict::Update).await
    }
}

#[async_trait]
impl CursorStore for PgTarget {
    async fn last_synced_at(&mut self, table: &str) -> Result<Option<NaiveDateTime>> {
        self.ensure_cursor_table().await?;
        let row = self
            .client
            .query_one(
                &format!(
                    "SELECT max(last_synced_at) FROM {} WHERE table_name = $1",
                    quote_ident(CURSOR_TABLE)
                ),
                &[&table],
            )
            .await
            .with_context(|| format!("Failed to read sync cursor for {}", table))?;
        Ok(row.get(0))
    }

    async fn set_last_synced_at(&mut self, table: &str, at: NaiveDateTime) -> Result<()> {
        self.ensure_cursor_table().await?;
        self.client
            .execute(
                &format!(
                    "INSERT INTO {}(table_name, last_synced_at) VALUES ($1, $2)
                     ON CONFLICT(table_name) DO UPDATE SET last_synced_at = EXCLUDED.last_synced_at",
                    quote_ident(CURSOR_TABLE)
                ),
                &[&table, &at],
            )
            .await
            .with_context(|| format!("Failed to store sync cursor for {}", table))?;
        Ok(())
    }
}

fn qualified(table: &DestinationTable) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

fn placeholders(num_columns: usize, num_rows: usize) -> String {
    (0..num_rows)
        .map(|row_idx| {
            let row: Vec<String> = (0..num_columns)
                .map(|col_idx| format!("${}", row_idx * num_columns + col_idx + 1))
                .collect();
            format!("({})", row.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a multi-row insert:
///
/// ```sql
/// INSERT INTO "schema"."table" ("a", "b") VALUES ($1, $2), ($3, $4)
/// ```
fn build_insert_query(table: &DestinationTable, columns: &[String], num_rows: usize) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified(table),
        quoted.join(", "),
        placeholders(columns.len(), num_rows)
    )
}

/// Build a multi-row upsert; conflicting rows get their non-key columns overwritten, or are
/// left alone when every column is part of the key.
fn build_upsert_query(
    table: &DestinationTable,
    columns: &[String],
    key_columns: &[String],
    update_columns: &[String],
    num_rows: usize,
) -> String {
    let keys: Vec<String> = key_columns.iter().map(|c| quote_ident(c)).collect();
    let action = if update_columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let sets: Vec<String> = update_columns
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
            .collect();
        format!("DO UPDATE SET {}", sets.join(", "))
    };

    format!(
        "{} ON CONFLICT ({}) {}",
        build_insert_query(table, columns, num_rows),
        keys.join(", "),
        action
    )
}

/// Convert a value into a parameter of the declared column type.
///
/// Nulls are bound as typed `None` so PostgreSQL can infer the parameter type.
fn value_to_sql(value: &Value, field_type: FieldType) -> Result<SqlParam> {
    if value.is_null() {
        return Ok(match field_type {
            FieldType::Text => Box::new(None::<String>),
            FieldType::Integer => Box::new(None::<i32>),
            FieldType::BigInt => Box::new(None::<i64>),
            FieldType::Double => Box::new(None::<f64>),
            FieldType::Numeric => Box::new(None::<Decimal>),
            FieldType::Timestamp => Box::new(None::<NaiveDateTime>),
            FieldType::Date => Box::new(None::<NaiveDate>),
            FieldType::Boolean => Box::new(None::<bool>),
        });
    }

    Ok(match field_type {
        FieldType::Text => match value {
            Value::Text(s) => Box::new(s.clone()),
            Value::Bytes(_) => bail!("binary data cannot be stored as text"),
            other => Box::new(other.to_string()),
        },
        FieldType::Integer => {
            let i = to_i64(value)?;
            Box::new(i32::try_from(i).map_err(|_| anyhow!("{} does not fit in integer", i))?)
        }
        FieldType::BigInt => Box::new(to_i64(value)?),
        FieldType::Double => Box::new(to_f64(value)?),
        FieldType::Numeric => Box::new(to_decimal(value)?),
        FieldType::Timestamp => Box::new(to_datetime(value)?),
        FieldType::Date => Box::new(to_datetime(value)?.date()),
        FieldType::Boolean => Box::new(match value {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "t" | "y" | "1"),
            other => bail!("{} is not a boolean", other.kind()),
        }),
    })
}

fn to_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        Value::Decimal(d) if d.fract().is_zero() => {
            d.to_i64().ok_or_else(|| anyhow!("{} is out of range", d))
        }
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .with_context(|| format!("'{}' is not an integer", s)),
        other => bail!("{} value {} is not an integer", other.kind(), other),
    }
}

fn to_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::Decimal(d) => d.to_f64().ok_or_else(|| anyhow!("{} is out of range", d)),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("'{}' is not a number", s)),
        other => bail!("{} is not a number", other.kind()),
    }
}

fn to_decimal(value: &Value) -> Result<Decimal> {
    match value {
        Value::Decimal(d) => Ok(*d),
        Value::Int(i) => Ok(Decimal::from(*i)),
        Value::Float(f) => Decimal::from_f64(*f).ok_or_else(|| anyhow!("{} is not a decimal", f)),
        Value::Text(s) => s
            .trim()
            .parse::<Decimal>()
            .with_context(|| format!("'{}' is not a decimal", s)),
        other => bail!("{} is not a decimal", other.kind()),
    }
}

fn to_datetime(value: &Value) -> Result<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Ok(*dt),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid date {}", d)),
        Value::Text(s) => parse_iso_datetime(s).ok_or_else(|| anyhow!("'{}' is not a timestamp", s)),
        other => bail!("{} is not a timestamp", other.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapping::Field;

    fn table() -> DestinationTable {
        DestinationTable::new(
            "public",
            "SAP_ordini_acquisto_lines",
            vec![
                Field::integer("id"),
                Field::integer("cod_documento"),
                Field::text("cod_articolo"),
                Field::double("quantity"),
            ],
        )
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_insert_query() {
        let sql = build_insert_query(&table(), &strings(&["id", "cod_documento"]), 2);
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"SAP_ordini_acquisto_lines\" (\"id\", \"cod_documento\") \
             VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_build_upsert_query_updates_non_key_columns() {
        let sql = build_upsert_query(
            &table(),
            &strings(&["id", "cod_documento", "quantity"]),
            &strings(&["id", "cod_documento"]),
            &strings(&["quantity"]),
            1,
        );
        assert!(sql.ends_with(
            "VALUES ($1, $2, $3) ON CONFLICT (\"id\", \"cod_documento\") \
             DO UPDATE SET \"quantity\" = EXCLUDED.\"quantity\""
        ));
    }

    #[test]
    fn test_build_upsert_query_all_key_columns() {
        let sql = build_upsert_query(
            &table(),
            &strings(&["id", "cod_documento"]),
            &strings(&["id", "cod_documento"]),
            &[],
            1,
        );
        assert!(sql.ends_with("ON CONFLICT (\"id\", \"cod_documento\") DO NOTHING"));
    }

    #[test]
    fn test_value_to_sql_coerces_to_declared_type() {
        assert!(value_to_sql(&Value::Int(5), FieldType::Integer).is_ok());
        assert!(value_to_sql(&Value::from("12"), FieldType::Integer).is_ok());
        assert!(value_to_sql(&Value::Int(i64::MAX), FieldType::Integer).is_err());
        assert!(value_to_sql(&Value::Float(2.5), FieldType::Integer).is_err());
        assert!(value_to_sql(&Value::from("2024-03-01"), FieldType::Timestamp).is_ok());
        assert!(value_to_sql(&Value::from("soon"), FieldType::Timestamp).is_err());
        assert!(value_to_sql(&Value::Bytes(vec![1]), FieldType::Text).is_err());
        assert!(value_to_sql(&Value::Null, FieldType::Double).is_ok());
    }
}
