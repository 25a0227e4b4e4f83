// ABOUTME: OCRD (business partner master data) -> SAP_anagrafica_business_partner

use crate::sync::mapping::{
    DestinationTable, Field, MappingError, SyncStrategy, TableMapping, SYNCED_AT_COLUMN,
    UPDATE_DATE_MARKER, UPDATE_TICKS_MARKER,
};
use crate::sync::transform::Transform;

pub const NAME: &str = "anagraficheBusinessPartner";

pub fn mapping() -> Result<TableMapping, MappingError> {
    TableMapping::builder(NAME, "dbo.OCRD")
        .column("CardCode", "id")
        .column("CardName", "name")
        .column("CardType", "type")
        .column("UpdateDate", UPDATE_DATE_MARKER)
        .column("UpdateTS", UPDATE_TICKS_MARKER)
        .transform("name", Transform::TEXT)
        .transform("type", Transform::TEXT)
        .primary_key("CardCode")
        .strategy(SyncStrategy::Upsert)
        .destination(DestinationTable::new(
            "public",
            "SAP_anagrafica_business_partner",
            vec![
                Field::text("id"),
                Field::text("name"),
                Field::text("type"),
                Field::timestamp(SYNCED_AT_COLUMN),
            ],
        ))
        .build()
}
