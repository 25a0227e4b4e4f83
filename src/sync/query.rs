// ABOUTME: Builds the T-SQL read query for a mapping, with the incremental predicate
// ABOUTME: Selects only mapped columns, bracket-quoted, filtered by the sync cursor

use super::mapping::{SyncStrategy, TableMapping};
use super::transform::encode_ticks;
use crate::utils::quote_mssql_ident;
use chrono::NaiveDateTime;

/// Build the source query for `mapping`.
///
/// UPSERT mappings that stage both update markers and have a cursor only select rows
/// changed after it: a later calendar day, or the same day with a later `HHMMSS` marker.
/// Everything else reads the whole table.
pub fn build_select(mapping: &TableMapping, cursor: Option<NaiveDateTime>) -> String {
    let columns = mapping
        .source_columns()
        .map(quote_mssql_ident)
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "SELECT {} FROM {}",
        columns,
        quote_table(mapping.source_table())
    );

    if let Some(predicate) = incremental_predicate(mapping, cursor) {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }

    sql
}

fn incremental_predicate(mapping: &TableMapping, cursor: Option<NaiveDateTime>) -> Option<String> {
    if mapping.strategy() != SyncStrategy::Upsert {
        return None;
    }
    let cursor = cursor?;
    let (date_column, ticks_column) = mapping.marker_columns()?;

    let date_column = quote_mssql_ident(date_column);
    let ticks_column = quote_mssql_ident(ticks_column);
    let cursor_date = cursor.date().format("%Y%m%d");
    let cursor_ticks = encode_ticks(&cursor);

    Some(format!(
        "(CONVERT(date, {date}) > CONVERT(date, '{day}') OR \
         (CONVERT(date, {date}) = CONVERT(date, '{day}') AND {ticks} > {ticks_value}))",
        date = date_column,
        day = cursor_date,
        ticks = ticks_column,
        ticks_value = cursor_ticks,
    ))
}

/// Quote each dotted part of `dbo.OITM` separately.
fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_mssql_ident)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapping::{
        DestinationTable, Field, UPDATE_DATE_MARKER, UPDATE_TICKS_MARKER, SYNCED_AT_COLUMN,
    };
    use chrono::NaiveDate;

    fn mapping(strategy: SyncStrategy, staged: bool) -> TableMapping {
        let mut builder = TableMapping::builder("items", "dbo.OITM")
            .column("ItemCode", "id")
            .column("ItemName", "description");
        if staged {
            builder = builder
                .column("UpdateDate", UPDATE_DATE_MARKER)
                .column("UpdateTS", UPDATE_TICKS_MARKER);
        }
        builder
            .primary_key("ItemCode")
            .strategy(strategy)
            .destination(DestinationTable::new(
                "public",
                "items",
                vec![
                    Field::text("id"),
                    Field::text("description"),
                    Field::timestamp(SYNCED_AT_COLUMN),
                ],
            ))
            .build()
            .unwrap()
    }

    fn cursor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap()
    }

    #[test]
    fn test_full_read_without_cursor() {
        let sql = build_select(&mapping(SyncStrategy::Upsert, true), None);
        assert_eq!(
            sql,
            "SELECT [ItemCode], [ItemName], [UpdateDate], [UpdateTS] FROM [dbo].[OITM]"
        );
    }

    #[test]
    fn test_incremental_predicate_with_cursor() {
        let sql = build_select(&mapping(SyncStrategy::Upsert, true), Some(cursor()));
        assert!(sql.ends_with(
            "WHERE (CONVERT(date, [UpdateDate]) > CONVERT(date, '20240301') OR \
             (CONVERT(date, [UpdateDate]) = CONVERT(date, '20240301') AND [UpdateTS] > 93015))"
        ));
    }

    #[test]
    fn test_midnight_cursor_has_zero_ticks() {
        let midnight = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let sql = build_select(&mapping(SyncStrategy::Upsert, true), Some(midnight));
        assert!(sql.contains("'20240105'"));
        assert!(sql.contains("[UpdateTS] > 0)"));
    }

    #[test]
    fn test_truncate_insert_never_filters() {
        let sql = build_select(&mapping(SyncStrategy::TruncateInsert, true), Some(cursor()));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_unstaged_markers_never_filter() {
        let sql = build_select(&mapping(SyncStrategy::Upsert, false), Some(cursor()));
        assert_eq!(sql, "SELECT [ItemCode], [ItemName] FROM [dbo].[OITM]");
    }
}
