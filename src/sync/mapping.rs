// ABOUTME: TableMapping describes how one SAP source table maps onto a PostgreSQL table
// ABOUTME: Holds column correspondence, transforms, key, strategy and the row transformer

use super::transform::{combine_markers, Transform, TransformError};
use super::value::{SourceRow, Value};
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// Destination columns starting with this prefix only stage values and are never written.
pub const SYNTHETIC_PREFIX: &str = "_";
/// Staging column for the source's calendar-day update marker.
pub const UPDATE_DATE_MARKER: &str = "_update_date";
/// Staging column for the source's `HHMMSS` update marker.
pub const UPDATE_TICKS_MARKER: &str = "_update_ts";
/// Destination column that receives the combined update timestamp.
pub const SYNCED_AT_COLUMN: &str = "last_synced_at";

pub fn is_synthetic(column: &str) -> bool {
    column.starts_with(SYNTHETIC_PREFIX)
}

/// How a table is brought up to date on each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Incremental read since the cursor, insert-or-update by primary key.
    Upsert,
    /// Full read, destination cleared and reloaded.
    TruncateInsert,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Upsert => "upsert",
            SyncStrategy::TruncateInsert => "truncate_insert",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PostgreSQL type of a declared destination field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    BigInt,
    Double,
    Numeric,
    Timestamp,
    Date,
    Boolean,
}

impl FieldType {
    /// PostgreSQL type name, used when describing a mapping.
    pub fn sql_name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::BigInt => "bigint",
            FieldType::Double => "double precision",
            FieldType::Numeric => "numeric",
            FieldType::Timestamp => "timestamp without time zone",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Double)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }
}

/// Declared shape of a destination table: a plain, typed field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTable {
    pub schema: String,
    pub name: String,
    pub fields: Vec<Field>,
}

impl DestinationTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Primary key columns, given as one name or several.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrimaryKey(Vec<String>);

impl PrimaryKey {
    pub fn columns(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for PrimaryKey {
    fn from(column: &str) -> Self {
        PrimaryKey(vec![column.to_string()])
    }
}

impl From<String> for PrimaryKey {
    fn from(column: String) -> Self {
        PrimaryKey(vec![column])
    }
}

impl<const N: usize> From<[&str; N]> for PrimaryKey {
    fn from(columns: [&str; N]) -> Self {
        PrimaryKey(columns.iter().map(|c| c.to_string()).collect())
    }
}

impl From<Vec<String>> for PrimaryKey {
    fn from(columns: Vec<String>) -> Self {
        PrimaryKey(columns)
    }
}

/// Invalid static mapping declaration, reported at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("mapping '{mapping}' declares no columns")]
    NoColumns { mapping: String },
    #[error("mapping '{mapping}' has no primary key")]
    EmptyPrimaryKey { mapping: String },
    #[error("mapping '{mapping}' maps source column '{column}' twice")]
    DuplicateSourceColumn { mapping: String, column: String },
    #[error("mapping '{mapping}' writes destination column '{column}' from more than one source column")]
    DuplicateDestColumn { mapping: String, column: String },
    #[error("mapping '{mapping}': primary key column '{column}' is not a mapped source column")]
    UnmappedKeyColumn { mapping: String, column: String },
    #[error("mapping '{mapping}': primary key column '{column}' maps to a staging column")]
    SyntheticKeyColumn { mapping: String, column: String },
    #[error("mapping '{mapping}': column '{column}' is not declared on the destination table")]
    UndeclaredField { mapping: String, column: String },
    #[error("mapping '{mapping}': transform bound to unmapped destination column '{column}'")]
    UnknownTransformTarget { mapping: String, column: String },
    #[error("mapping '{mapping}' stages update markers but its destination has no '{SYNCED_AT_COLUMN}' field")]
    MissingSyncedAtField { mapping: String },
    #[error("mapping '{mapping}' has no destination table")]
    MissingDestination { mapping: String },
}

/// One source column bound to one destination column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub source: String,
    pub dest: String,
    pub transform: Option<Transform>,
}

/// Where a mapped value lands after transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Write(usize),
    DateMarker,
    TicksMarker,
    Discard,
}

/// A destination-shaped record aligned with its mapping's write columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Values at the given positions, used to compare primary keys.
    pub fn project(&self, positions: &[usize]) -> Vec<&Value> {
        positions.iter().map(|&idx| &self.values[idx]).collect()
    }
}

/// A row that survived transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub record: Record,
    /// Combined update timestamp, when the mapping stages both markers and they decode.
    pub synced_at: Option<NaiveDateTime>,
}

/// A row a transform refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("column '{column}': {source}")]
pub struct RowError {
    pub column: String,
    #[source]
    pub source: TransformError,
}

/// Result of transforming one source row. Rejections are counted, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Transformed(TransformedRow),
    Rejected(RowError),
}

/// Immutable description of one replicated table.
#[derive(Debug, Clone)]
pub struct TableMapping {
    name: String,
    source_table: String,
    columns: Vec<ColumnMapping>,
    primary_key: Vec<String>,
    strategy: SyncStrategy,
    destination: DestinationTable,
    slots: Vec<Slot>,
    write_columns: Arc<[String]>,
    key_columns: Vec<String>,
    key_positions: Vec<usize>,
    update_columns: Vec<String>,
    markers: Option<(String, String)>,
    synced_at_position: Option<usize>,
}

impl TableMapping {
    pub fn builder(name: impl Into<String>, source_table: impl Into<String>) -> TableMappingBuilder {
        TableMappingBuilder {
            name: name.into(),
            source_table: source_table.into(),
            columns: Vec::new(),
            transforms: Vec::new(),
            primary_key: PrimaryKey::default(),
            strategy: SyncStrategy::Upsert,
            destination: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    /// Primary key as source column names.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub fn destination(&self) -> &DestinationTable {
        &self.destination
    }

    /// Source columns the query has to select, in declaration order.
    pub fn source_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.source.as_str())
    }

    /// Destination columns written for every record, in record order.
    pub fn write_columns(&self) -> &[String] {
        &self.write_columns
    }

    /// Primary key as destination column names.
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Record positions of the key columns.
    pub fn key_positions(&self) -> &[usize] {
        &self.key_positions
    }

    /// Write columns overwritten on conflict; empty means conflicting rows are skipped.
    pub fn update_columns(&self) -> &[String] {
        &self.update_columns
    }

    /// Source columns carrying the date and ticks markers, when both are staged.
    pub fn marker_columns(&self) -> Option<(&str, &str)> {
        self.markers
            .as_ref()
            .map(|(date, ticks)| (date.as_str(), ticks.as_str()))
    }

    /// Convert one raw source row into a destination record.
    pub fn transform_row(&self, row: &SourceRow) -> RowOutcome {
        let mut values = vec![Value::Null; self.write_columns.len()];
        let mut date_marker = None;
        let mut ticks_marker = None;

        for (mapping, slot) in self.columns.iter().zip(&self.slots) {
            let Some(raw) = row.get(&mapping.source) else {
                continue;
            };

            let value = match &mapping.transform {
                Some(transform) => match transform.apply(raw) {
                    Ok(value) => value,
                    Err(source) => {
                        return RowOutcome::Rejected(RowError {
                            column: mapping.dest.clone(),
                            source,
                        })
                    }
                },
                None => raw.clone(),
            };

            match slot {
                Slot::Write(idx) => values[*idx] = value,
                Slot::DateMarker => date_marker = Some(value),
                Slot::TicksMarker => ticks_marker = Some(value),
                Slot::Discard => {}
            }
        }

        let synced_at = match self.synced_at_position {
            Some(idx) => {
                let combined = combine_markers(date_marker.as_ref(), ticks_marker.as_ref());
                values[idx] = Value::from(combined);
                combined
            }
            None => None,
        };

        RowOutcome::Transformed(TransformedRow {
            record: Record {
                columns: Arc::clone(&self.write_columns),
                values,
            },
            synced_at,
        })
    }
}

pub struct TableMappingBuilder {
    name: String,
    source_table: String,
    columns: Vec<(String, String)>,
    transforms: Vec<(String, Transform)>,
    primary_key: PrimaryKey,
    strategy: SyncStrategy,
    destination: Option<DestinationTable>,
}

impl TableMappingBuilder {
    pub fn column(mut self, source: impl Into<String>, dest: impl Into<String>) -> Self {
        self.columns.push((source.into(), dest.into()));
        self
    }

    /// Bind a transform to a destination column.
    pub fn transform(mut self, dest: impl Into<String>, transform: Transform) -> Self {
        self.transforms.push((dest.into(), transform));
        self
    }

    pub fn primary_key(mut self, key: impl Into<PrimaryKey>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn destination(mut self, destination: DestinationTable) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn build(self) -> Result<TableMapping, MappingError> {
        let name = self.name;
        let destination = self
            .destination
            .ok_or_else(|| MappingError::MissingDestination {
                mapping: name.clone(),
            })?;

        if self.columns.is_empty() {
            return Err(MappingError::NoColumns { mapping: name });
        }
        if self.primary_key.columns().is_empty() {
            return Err(MappingError::EmptyPrimaryKey { mapping: name });
        }

        for (idx, (source, _)) in self.columns.iter().enumerate() {
            if self.columns[..idx].iter().any(|(s, _)| s == source) {
                return Err(MappingError::DuplicateSourceColumn {
                    mapping: name,
                    column: source.clone(),
                });
            }
        }

        for (dest, _) in &self.transforms {
            if !self.columns.iter().any(|(_, d)| d == dest) {
                return Err(MappingError::UnknownTransformTarget {
                    mapping: name,
                    column: dest.clone(),
                });
            }
        }

        let has_date = self.columns.iter().any(|(_, d)| d == UPDATE_DATE_MARKER);
        let has_ticks = self.columns.iter().any(|(_, d)| d == UPDATE_TICKS_MARKER);
        let timestamped = has_date && has_ticks;

        let mut write_columns: Vec<String> = Vec::new();
        let mut slots = Vec::with_capacity(self.columns.len());
        for (_, dest) in &self.columns {
            let slot = match dest.as_str() {
                UPDATE_DATE_MARKER => Slot::DateMarker,
                UPDATE_TICKS_MARKER => Slot::TicksMarker,
                d if is_synthetic(d) => Slot::Discard,
                d => {
                    if destination.field(d).is_none() {
                        return Err(MappingError::UndeclaredField {
                            mapping: name,
                            column: d.to_string(),
                        });
                    }
                    if write_columns.iter().any(|c| c == d) {
                        return Err(MappingError::DuplicateDestColumn {
                            mapping: name,
                            column: d.to_string(),
                        });
                    }
                    write_columns.push(d.to_string());
                    Slot::Write(write_columns.len() - 1)
                }
            };
            slots.push(slot);
        }

        let synced_at_position = if timestamped {
            if destination.field(SYNCED_AT_COLUMN).is_none() {
                return Err(MappingError::MissingSyncedAtField { mapping: name });
            }
            if !write_columns.iter().any(|c| c == SYNCED_AT_COLUMN) {
                write_columns.push(SYNCED_AT_COLUMN.to_string());
            }
            write_columns.iter().position(|c| c == SYNCED_AT_COLUMN)
        } else {
            None
        };

        let mut key_columns = Vec::with_capacity(self.primary_key.columns().len());
        for key in self.primary_key.columns() {
            let dest = match self.columns.iter().find(|(s, _)| s == key) {
                Some((_, dest)) => dest,
                None => {
                    return Err(MappingError::UnmappedKeyColumn {
                        mapping: name,
                        column: key.clone(),
                    })
                }
            };
            if is_synthetic(dest) {
                return Err(MappingError::SyntheticKeyColumn {
                    mapping: name,
                    column: key.clone(),
                });
            }
            key_columns.push(dest.clone());
        }

        let key_positions = key_columns
            .iter()
            .filter_map(|k| write_columns.iter().position(|c| c == k))
            .collect();
        let update_columns = write_columns
            .iter()
            .filter(|c| !key_columns.contains(c))
            .cloned()
            .collect();

        let markers = if timestamped {
            let source_of = |marker: &str| {
                self.columns
                    .iter()
                    .find(|(_, d)| d == marker)
                    .map(|(s, _)| s.clone())
                    .unwrap_or_default()
            };
            Some((source_of(UPDATE_DATE_MARKER), source_of(UPDATE_TICKS_MARKER)))
        } else {
            None
        };

        let columns = self
            .columns
            .into_iter()
            .map(|(source, dest)| {
                let transform = self
                    .transforms
                    .iter()
                    .rev()
                    .find(|(d, _)| *d == dest)
                    .map(|(_, t)| *t);
                ColumnMapping {
                    source,
                    dest,
                    transform,
                }
            })
            .collect();

        Ok(TableMapping {
            name,
            source_table: self.source_table,
            columns,
            primary_key: self.primary_key.0,
            strategy: self.strategy,
            destination,
            slots,
            write_columns: write_columns.into(),
            key_columns,
            key_positions,
            update_columns,
            markers,
            synced_at_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn partners() -> TableMapping {
        TableMapping::builder("partners", "dbo.OCRD")
            .column("CardCode", "id")
            .column("CardName", "name")
            .column("Balance", "balance")
            .column("UpdateDate", UPDATE_DATE_MARKER)
            .column("UpdateTS", UPDATE_TICKS_MARKER)
            .transform("name", Transform::TEXT)
            .transform("balance", Transform::FLOAT)
            .primary_key("CardCode")
            .destination(DestinationTable::new(
                "public",
                "partners",
                vec![
                    Field::text("id"),
                    Field::text("name"),
                    Field::double("balance"),
                    Field::timestamp(SYNCED_AT_COLUMN),
                ],
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_computes_write_and_key_columns() {
        let mapping = partners();
        assert_eq!(
            mapping.write_columns(),
            &["id", "name", "balance", SYNCED_AT_COLUMN]
        );
        assert_eq!(mapping.key_columns(), &["id"]);
        assert_eq!(mapping.key_positions(), &[0]);
        assert_eq!(mapping.update_columns(), &["name", "balance", SYNCED_AT_COLUMN]);
        assert_eq!(mapping.marker_columns(), Some(("UpdateDate", "UpdateTS")));
        assert_eq!(mapping.strategy(), SyncStrategy::Upsert);
        assert_eq!(
            mapping.source_columns().collect::<Vec<_>>(),
            vec!["CardCode", "CardName", "Balance", "UpdateDate", "UpdateTS"]
        );
    }

    #[test]
    fn test_transform_row_skips_synthetic_and_derives_timestamp() {
        let mapping = partners();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let row = SourceRow::new()
            .with("CardCode", "C001")
            .with("CardName", "Acme")
            .with("Balance", "12.5")
            .with("UpdateDate", day.and_hms_opt(0, 0, 0).unwrap())
            .with("UpdateTS", 93015i64);

        let RowOutcome::Transformed(out) = mapping.transform_row(&row) else {
            panic!("row should transform");
        };
        let expected = day.and_hms_opt(9, 30, 15).unwrap();
        assert_eq!(out.synced_at, Some(expected));
        assert_eq!(out.record.get("id"), Some(&Value::from("C001")));
        assert_eq!(out.record.get("balance"), Some(&Value::Float(12.5)));
        assert_eq!(out.record.get(SYNCED_AT_COLUMN), Some(&Value::DateTime(expected)));
        assert_eq!(out.record.get(UPDATE_DATE_MARKER), None);
        assert_eq!(out.record.values().len(), 4);
    }

    #[test]
    fn test_transform_row_absent_columns_become_null() {
        let mapping = partners();
        let row = SourceRow::new().with("CardCode", "C002");

        let RowOutcome::Transformed(out) = mapping.transform_row(&row) else {
            panic!("row should transform");
        };
        assert_eq!(out.record.get("name"), Some(&Value::Null));
        assert_eq!(out.synced_at, None);
        assert_eq!(out.record.get(SYNCED_AT_COLUMN), Some(&Value::Null));
    }

    #[test]
    fn test_transform_row_rejects_bad_value() {
        let mapping = partners();
        let row = SourceRow::new()
            .with("CardCode", "C003")
            .with("Balance", "lots");

        match mapping.transform_row(&row) {
            RowOutcome::Rejected(err) => {
                assert_eq!(err.column, "balance");
                assert!(err.to_string().contains("'lots' is not a number"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_composite_key_and_no_update_columns() {
        let mapping = TableMapping::builder("catalog", "dbo.OSCN")
            .column("ItemCode", "cod_articolo")
            .column("CardCode", "cod_business_partner")
            .primary_key(["ItemCode", "CardCode"])
            .strategy(SyncStrategy::TruncateInsert)
            .destination(DestinationTable::new(
                "public",
                "catalog",
                vec![Field::text("cod_articolo"), Field::text("cod_business_partner")],
            ))
            .build()
            .unwrap();

        assert_eq!(mapping.key_columns(), &["cod_articolo", "cod_business_partner"]);
        assert!(mapping.update_columns().is_empty());
        assert_eq!(mapping.marker_columns(), None);
    }

    #[test]
    fn test_key_column_must_be_mapped() {
        let err = TableMapping::builder("bad", "dbo.X")
            .column("A", "a")
            .primary_key("B")
            .destination(DestinationTable::new("public", "x", vec![Field::text("a")]))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::UnmappedKeyColumn {
                mapping: "bad".to_string(),
                column: "B".to_string()
            }
        );
    }

    #[test]
    fn test_undeclared_field_rejected() {
        let err = TableMapping::builder("bad", "dbo.X")
            .column("A", "a")
            .column("B", "b")
            .primary_key("A")
            .destination(DestinationTable::new("public", "x", vec![Field::text("a")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::UndeclaredField { column, .. } if column == "b"));
    }

    #[test]
    fn test_markers_require_synced_at_field() {
        let err = TableMapping::builder("bad", "dbo.X")
            .column("A", "a")
            .column("UpdateDate", UPDATE_DATE_MARKER)
            .column("UpdateTS", UPDATE_TICKS_MARKER)
            .primary_key("A")
            .destination(DestinationTable::new("public", "x", vec![Field::text("a")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::MissingSyncedAtField { .. }));
    }

    #[test]
    fn test_transform_target_must_exist() {
        let err = TableMapping::builder("bad", "dbo.X")
            .column("A", "a")
            .transform("z", Transform::TEXT)
            .primary_key("A")
            .destination(DestinationTable::new("public", "x", vec![Field::text("a")]))
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownTransformTarget { .. }));
    }

    #[test]
    fn test_duplicate_source_column_rejected() {
        let err = TableMapping::builder("bad", "dbo.X")
            .column("A", "a")
            .column("A", "b")
            .primary_key("A")
            .destination(DestinationTable::new(
                "public",
                "x",
                vec![Field::text("a"), Field::text("b")],
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, MappingError::DuplicateSourceColumn { .. }));
    }

    #[test]
    fn test_duplicate_dest_column_rejected() {
        let err = TableMapping::builder("bad", "dbo.X")
            .column("A", "id")
            .column("B", "name")
            .column("C", "name")
            .primary_key("A")
            .destination(DestinationTable::new(
                "public",
                "x",
                vec![Field::text("id"), Field::text("name")],
            ))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::DuplicateDestColumn {
                mapping: "bad".to_string(),
                column: "name".to_string(),
            }
        );
    }
}
