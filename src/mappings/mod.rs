// ABOUTME: Built-in SAP Business One table mappings
// ABOUTME: One module per replicated table; all() feeds the registry

pub mod business_partners;
pub mod items;
pub mod partner_catalog;
pub mod purchase_order_lines;
pub mod purchase_orders;

use crate::sync::mapping::{MappingError, TableMapping};

/// Every built-in mapping, validated.
pub fn all() -> Result<Vec<TableMapping>, MappingError> {
    Ok(vec![
        items::mapping()?,
        business_partners::mapping()?,
        purchase_orders::mapping()?,
        purchase_order_lines::mapping()?,
        partner_catalog::mapping()?,
    ])
}
