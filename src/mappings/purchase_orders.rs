// ABOUTME: OPOR (purchase order headers) -> SAP_ordini_acquisto

use crate::sync::mapping::{
    DestinationTable, Field, MappingError, SyncStrategy, TableMapping, SYNCED_AT_COLUMN,
    UPDATE_DATE_MARKER, UPDATE_TICKS_MARKER,
};
use crate::sync::transform::Transform;

pub const NAME: &str = "ordiniAcquisto";

pub fn mapping() -> Result<TableMapping, MappingError> {
    TableMapping::builder(NAME, "dbo.OPOR")
        .column("DocEntry", "id")
        .column("DocNum", "code")
        .column("DocDate", "doc_date")
        .column("DocDueDate", "doc_due_date")
        .column("CardCode", "cod_business_partner")
        .column("UpdateDate", UPDATE_DATE_MARKER)
        .column("UpdateTS", UPDATE_TICKS_MARKER)
        .transform("code", Transform::INTEGER)
        .transform("doc_date", Transform::TIMESTAMP)
        .transform("doc_due_date", Transform::TIMESTAMP)
        .transform("cod_business_partner", Transform::TEXT)
        .primary_key("DocEntry")
        .strategy(SyncStrategy::Upsert)
        .destination(DestinationTable::new(
            "public",
            "SAP_ordini_acquisto",
            vec![
                Field::integer("id"),
                Field::integer("code"),
                Field::timestamp("doc_date"),
                Field::timestamp("doc_due_date"),
                Field::text("cod_business_partner"),
                Field::timestamp(SYNCED_AT_COLUMN),
            ],
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapping::RowOutcome;
    use crate::sync::value::{SourceRow, Value};
    use chrono::NaiveDate;

    #[test]
    fn test_order_row_transforms() {
        let mapping = mapping().unwrap();
        let doc_date = NaiveDate::from_ymd_opt(2024, 2, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let row = SourceRow::new()
            .with("DocEntry", 812i64)
            .with("DocNum", "40012")
            .with("DocDate", doc_date)
            .with("DocDueDate", "2024-03-01")
            .with("CardCode", "F0001")
            .with("UpdateDate", doc_date)
            .with("UpdateTS", Value::Null);

        let RowOutcome::Transformed(out) = mapping.transform_row(&row) else {
            panic!("row should transform");
        };
        assert_eq!(out.record.get("id"), Some(&Value::Int(812)));
        assert_eq!(out.record.get("code"), Some(&Value::Int(40012)));
        assert_eq!(out.record.get("doc_date"), Some(&Value::DateTime(doc_date)));
        assert_eq!(
            out.record.get("doc_due_date"),
            Some(&Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            ))
        );
        assert_eq!(out.synced_at, None);
    }
}
