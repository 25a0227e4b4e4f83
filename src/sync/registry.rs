// ABOUTME: Name -> TableMapping lookup shared read-only across sync tasks
// ABOUTME: Resolution fails fast on unknown names before any I/O happens

use super::error::SyncError;
use super::mapping::{MappingError, TableMapping};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: BTreeMap<String, Arc<TableMapping>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-validated mappings. A repeated name replaces the earlier one.
    pub fn from_mappings(mappings: impl IntoIterator<Item = TableMapping>) -> Self {
        let mut registry = Self::new();
        for mapping in mappings {
            registry.register(mapping);
        }
        registry
    }

    /// The SAP Business One catalog shipped with the tool.
    pub fn builtin() -> Result<Self, MappingError> {
        Ok(Self::from_mappings(crate::mappings::all()?))
    }

    pub fn register(&mut self, mapping: TableMapping) {
        self.mappings
            .insert(mapping.name().to_string(), Arc::new(mapping));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<TableMapping>, SyncError> {
        self.mappings
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownMapping {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// Resolve every name, failing on the first unknown one.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Arc<TableMapping>>, SyncError> {
        names.iter().map(|n| self.resolve(n.as_ref())).collect()
    }

    /// Registered names in stable (sorted) order.
    pub fn names(&self) -> Vec<String> {
        self.mappings.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableMapping>> {
        self.mappings.values()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_resolves() {
        let registry = MappingRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 5);

        let mapping = registry.resolve("anagraficheArticoli").unwrap();
        assert_eq!(mapping.source_table(), "dbo.OITM");
        assert_eq!(mapping.destination().name, "SAP_anagrafica_articoli");
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let registry = MappingRegistry::builtin().unwrap();
        let err = registry.resolve("doesNotExist").unwrap_err();
        assert!(matches!(err, SyncError::UnknownMapping { ref name, .. } if name == "doesNotExist"));
        assert!(err.to_string().contains("ordiniAcquisto"));
    }

    #[test]
    fn test_resolve_all_stops_at_first_unknown() {
        let registry = MappingRegistry::builtin().unwrap();
        assert!(registry
            .resolve_all(&["ordiniAcquisto", "nope", "anagraficheArticoli"])
            .is_err());
        assert_eq!(
            registry
                .resolve_all(&["ordiniAcquisto", "ordiniAcquistoLines"])
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = MappingRegistry::builtin().unwrap();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
