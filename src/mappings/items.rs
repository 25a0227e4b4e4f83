// ABOUTME: OITM (item master data) -> SAP_anagrafica_articoli

use crate::sync::mapping::{
    DestinationTable, Field, MappingError, SyncStrategy, TableMapping, SYNCED_AT_COLUMN,
    UPDATE_DATE_MARKER, UPDATE_TICKS_MARKER,
};
use crate::sync::transform::Transform;

pub const NAME: &str = "anagraficheArticoli";

const TEXT_COLUMNS: [(&str, &str); 12] = [
    ("ItemName", "description"),
    ("FrgnName", "caratt_destination"),
    ("U_Aggiuntiva", "critico"),
    ("U_FamigliaTornitura", "ubicazione"),
    ("U_FamigliaLEV2", "macchina_applicazione"),
    ("U_FamigliaLEV3", "stato"),
    ("U_SFT_FAMILY_LEV1", "costruttore"),
    ("U_SFT_FAMILY_LEV2", "fornitore"),
    ("U_SFT_FAMILY_LEV3", "tipo_articolo"),
    ("U_SFT_PURCH_SPEC", "auto_ingranaggi"),
    ("U_Dev_ArtBase", "note_acquisti"),
    ("CardCode", "cod_business_partner_pref"),
];

pub fn mapping() -> Result<TableMapping, MappingError> {
    let mut fields = vec![Field::text("id")];
    let mut builder = TableMapping::builder(NAME, "dbo.OITM").column("ItemCode", "id");

    for (source, dest) in TEXT_COLUMNS {
        fields.push(Field::text(dest));
        builder = builder.column(source, dest).transform(dest, Transform::TEXT);
    }

    fields.extend([
        Field::double("scorta_minima"),
        Field::double("qty_riordino"),
        Field::timestamp(SYNCED_AT_COLUMN),
    ]);

    builder
        .column("MinLevel", "scorta_minima")
        .column("ReorderQty", "qty_riordino")
        .column("UpdateDate", UPDATE_DATE_MARKER)
        .column("UpdateTS", UPDATE_TICKS_MARKER)
        .transform("scorta_minima", Transform::FLOAT)
        .transform("qty_riordino", Transform::FLOAT)
        .primary_key("ItemCode")
        .strategy(SyncStrategy::Upsert)
        .destination(DestinationTable::new(
            "public",
            "SAP_anagrafica_articoli",
            fields,
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapping::RowOutcome;
    use crate::sync::value::{SourceRow, Value};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn test_item_row_transforms() {
        let mapping = mapping().unwrap();
        let row = SourceRow::new()
            .with("ItemCode", "A001")
            .with("ItemName", "Bearing 6204")
            .with("FrgnName", Value::Null)
            .with("MinLevel", Value::Decimal(Decimal::new(25, 1)))
            .with("ReorderQty", Value::Null)
            .with(
                "UpdateDate",
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )
            .with("UpdateTS", 93015i64);

        let RowOutcome::Transformed(out) = mapping.transform_row(&row) else {
            panic!("row should transform");
        };
        let record = out.record;
        assert_eq!(record.get("id"), Some(&Value::from("A001")));
        assert_eq!(record.get("description"), Some(&Value::from("Bearing 6204")));
        assert_eq!(record.get("caratt_destination"), Some(&Value::Null));
        assert_eq!(record.get("scorta_minima"), Some(&Value::Float(2.5)));
        assert_eq!(record.get("qty_riordino"), Some(&Value::Null));
        assert!(out.synced_at.is_some());
        assert_eq!(record.values().len(), 16);
    }
}
