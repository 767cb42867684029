//! Field registry
//!
//! Holds declared field configurations, the default configuration applied
//! to undeclared fields, and the names of every field seen during ingestion.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use super::field_type::{FieldConfig, FieldFlags, ValueGenerator};

/// Virtual field aggregating tokens of every field flagged `IN_ALL`
pub const ALL_FIELD: &str = "_all";

/// Virtual field recording the non-empty field names of each document
pub const FIELDS_PRESENT: &str = "_fields";

/// Index-wide field configuration, shared by reference with every segment
#[derive(Debug)]
pub struct FieldRegistry {
    declared: BTreeMap<String, FieldConfig>,
    default: FieldConfig,
    virtual_config: FieldConfig,
    discovered: RwLock<BTreeSet<String>>,
}

impl FieldRegistry {
    pub fn new(default: FieldConfig) -> Self {
        Self {
            declared: BTreeMap::new(),
            default,
            virtual_config: FieldConfig::new(FieldFlags::SEARCHABLE),
            discovered: RwLock::new(BTreeSet::new()),
        }
    }

    /// Declare a field with an explicit configuration
    pub fn with_field(mut self, name: impl Into<String>, config: FieldConfig) -> Self {
        self.declared.insert(name.into(), config);
        self
    }

    pub fn default_config(&self) -> &FieldConfig {
        &self.default
    }

    /// Configuration for a field, without recording it as discovered
    pub fn config(&self, name: &str) -> &FieldConfig {
        if name == ALL_FIELD || name == FIELDS_PRESENT {
            return &self.virtual_config;
        }
        self.declared.get(name).unwrap_or(&self.default)
    }

    /// Configuration for a field seen during ingestion
    pub fn resolve(&self, name: &str) -> &FieldConfig {
        if !self.declared.contains_key(name) {
            self.observe(name);
        }
        self.config(name)
    }

    /// Record a field name as known
    pub fn observe(&self, name: &str) {
        if self.discovered.read().contains(name) {
            return;
        }
        self.discovered.write().insert(name.to_string());
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    /// Declared fields that derive their value from the document
    pub fn generators(&self) -> impl Iterator<Item = (&String, &ValueGenerator)> {
        self.declared
            .iter()
            .filter_map(|(name, config)| config.generator.as_ref().map(|g| (name, g)))
    }

    /// Every declared, virtual, and discovered field with its resolved configuration
    pub fn list_all_known_fields(&self) -> BTreeMap<String, FieldConfig> {
        let mut fields: BTreeMap<String, FieldConfig> = self
            .declared
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();
        for name in self.discovered.read().iter() {
            fields
                .entry(name.clone())
                .or_insert_with(|| self.default.clone());
        }
        fields.insert(ALL_FIELD.to_string(), self.virtual_config.clone());
        fields.insert(FIELDS_PRESENT.to_string(), self.virtual_config.clone());
        fields
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new(FieldConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[test]
    fn test_resolve_records_discovered_fields() {
        let registry = FieldRegistry::default()
            .with_field("price", FieldConfig::new(FieldFlags::SORT_OPTIMIZED));
        assert!(registry.resolve("price").is_sort_optimized());
        assert!(registry.resolve("color").is_searchable());

        let known = registry.list_all_known_fields();
        assert!(known.contains_key("price"));
        assert!(known.contains_key("color"));
        assert!(known.contains_key(ALL_FIELD));
        assert!(known.contains_key(FIELDS_PRESENT));
        assert!(!known.contains_key("never_seen"));
    }

    #[test]
    fn test_config_does_not_record() {
        let registry = FieldRegistry::default();
        let _ = registry.config("ghost");
        assert!(!registry.list_all_known_fields().contains_key("ghost"));
    }

    #[test]
    fn test_generators() {
        let registry = FieldRegistry::default().with_field(
            "name_len",
            FieldConfig::new(FieldFlags::SEARCHABLE).with_generator(|doc| {
                doc.get("name")
                    .and_then(Value::as_str)
                    .map(|s| Value::Int(s.len() as i64))
            }),
        );
        let generators: Vec<_> = registry.generators().map(|(n, _)| n.clone()).collect();
        assert_eq!(generators, vec!["name_len".to_string()]);
    }
}
