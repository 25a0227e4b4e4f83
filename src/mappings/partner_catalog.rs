// ABOUTME: OSCN (business partner catalog numbers) -> SAP_catalogo_business_partner, reloaded in full

use crate::sync::mapping::{
    DestinationTable, Field, MappingError, SyncStrategy, TableMapping,
};
use crate::sync::transform::Transform;

pub const NAME: &str = "catalogoBusinessPartner";

pub fn mapping() -> Result<TableMapping, MappingError> {
    TableMapping::builder(NAME, "dbo.OSCN")
        .column("ItemCode", "cod_articolo")
        .column("CardCode", "cod_business_partner")
        .column("Substitute", "translation")
        .transform("cod_articolo", Transform::TEXT)
        .transform("cod_business_partner", Transform::TEXT)
        .transform("translation", Transform::TEXT)
        .primary_key(["ItemCode", "CardCode", "Substitute"])
        .strategy(SyncStrategy::TruncateInsert)
        .destination(DestinationTable::new(
            "public",
            "SAP_catalogo_business_partner",
            vec![
                Field::text("cod_articolo"),
                Field::text("cod_business_partner"),
                Field::text("translation"),
            ],
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_column_is_key() {
        let mapping = mapping().unwrap();
        assert_eq!(mapping.key_columns().len(), 3);
        assert!(mapping.update_columns().is_empty());
    }
}
