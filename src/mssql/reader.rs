// ABOUTME: MssqlReader runs source queries on SQL Server and converts rows to SourceRow
// ABOUTME: Maps tiberius ColumnData variants onto the shared Value model

use super::connection::{connect_with_retry, MssqlClient};
use crate::sync::source::SourceReader;
use crate::sync::value::{SourceRow, Value};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::time::Duration;
use tiberius::{ColumnData, FromSql, Row};

pub struct MssqlReader {
    client: MssqlClient,
}

impl MssqlReader {
    pub fn new(client: MssqlClient) -> Self {
        Self { client }
    }

    pub async fn connect(connection: &str, max_retries: u32, retry_delay: Duration) -> Result<Self> {
        let client = connect_with_retry(connection, max_retries, retry_delay).await?;
        Ok(Self::new(client))
    }

    /// Round-trip a trivial query.
    pub async fn ping(&mut self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .context("SQL Server ping failed")?
            .into_row()
            .await
            .context("SQL Server ping failed")?;
        Ok(())
    }

    /// Run `select_sql` wrapped so that it returns no rows; fails when a table or column is missing.
    pub async fn probe_query(&mut self, select_sql: &str) -> Result<()> {
        let probe = format!("SELECT TOP 0 * FROM ({}) AS probe", select_sql);
        self.client
            .simple_query(probe)
            .await?
            .into_results()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MssqlReader {
    async fn fetch(&mut self, query: &str) -> Result<Vec<SourceRow>> {
        let rows = self
            .client
            .simple_query(query)
            .await
            .context("SQL Server query failed")?
            .into_first_result()
            .await
            .context("Failed to read SQL Server result set")?;

        rows.into_iter().map(convert_row).collect()
    }
}

fn convert_row(row: Row) -> Result<SourceRow> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut out = SourceRow::with_capacity(names.len());
    for (name, data) in names.into_iter().zip(row) {
        let value = convert_value(&data).with_context(|| format!("Cannot read column {}", name))?;
        out.push(name, value);
    }
    Ok(out)
}

fn convert_value(data: &ColumnData<'static>) -> Result<Value> {
    let value = match data {
        ColumnData::U8(v) => Value::from(v.map(i64::from)),
        ColumnData::I16(v) => Value::from(v.map(i64::from)),
        ColumnData::I32(v) => Value::from(v.map(i64::from)),
        ColumnData::I64(v) => Value::from(*v),
        ColumnData::F32(v) => Value::from(v.map(f64::from)),
        ColumnData::F64(v) => Value::from(*v),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::String(v) => Value::from(v.as_ref().map(|s| s.to_string())),
        ColumnData::Guid(v) => Value::from(v.map(|g| g.to_string())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| Value::Bytes(b.to_vec()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(Some(n)) => {
            Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                .map(Value::Decimal)
                .with_context(|| {
                    format!(
                        "numeric {} (scale {}) does not fit a 28-digit decimal",
                        n.value(),
                        n.scale()
                    )
                })?
        }
        ColumnData::Numeric(None) => Value::Null,
        ColumnData::Date(_) => NaiveDate::from_sql(data)?
            .map(Value::Date)
            .unwrap_or(Value::Null),
        ColumnData::Time(_) => Value::from(NaiveTime::from_sql(data)?.map(|t| t.to_string())),
        ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::Utc>::from_sql(data)?
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            Value::from(NaiveDateTime::from_sql(data)?)
        }
        ColumnData::Xml(v) => Value::from(v.as_ref().map(|x| x.clone().into_owned().into_string())),
    };
    Ok(value)
}
