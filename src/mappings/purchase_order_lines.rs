// ABOUTME: POR1 (purchase order lines) -> SAP_ordini_acquisto_lines, reloaded in full

use crate::sync::mapping::{
    DestinationTable, Field, MappingError, SyncStrategy, TableMapping,
};
use crate::sync::transform::Transform;

pub const NAME: &str = "ordiniAcquistoLines";

pub fn mapping() -> Result<TableMapping, MappingError> {
    TableMapping::builder(NAME, "dbo.POR1")
        .column("LineNum", "id")
        .column("DocEntry", "cod_documento")
        .column("ItemCode", "cod_articolo")
        .column("Quantity", "quantity")
        .transform("cod_articolo", Transform::TEXT)
        .transform("quantity", Transform::FLOAT)
        .primary_key(["LineNum", "DocEntry"])
        .strategy(SyncStrategy::TruncateInsert)
        .destination(DestinationTable::new(
            "public",
            "SAP_ordini_acquisto_lines",
            vec![
                Field::integer("id"),
                Field::integer("cod_documento"),
                Field::text("cod_articolo"),
                Field::double("quantity"),
            ],
        ))
        .build()
}
