//! Field flags and per-field configuration
//!
//! A field is configured with a flag set describing how it is indexed and
//! retained, an optional analyzer turning string values into tokens, and an
//! optional generator deriving the field's value from the whole document.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use crate::config::TokenizerConfig;
use crate::models::{Document, Value};
use crate::tokenizer::{Analyzer, TextAnalyzer};

/// Combinable field flags
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldFlags(u8);

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags(0);
    /// Values are tokenized into the inverted index
    pub const SEARCHABLE: FieldFlags = FieldFlags(1);
    /// Values are retained for projection
    pub const STORED: FieldFlags = FieldFlags(1 << 1);
    /// Values get a rank column in persisted segments
    pub const SORT_OPTIMIZED: FieldFlags = FieldFlags(1 << 2);
    /// Tokens are also added to the `_all` virtual field
    pub const IN_ALL: FieldFlags = FieldFlags(1 << 3);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        FieldFlags(bits & 0b1111)
    }

    pub fn contains(self, other: FieldFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: FieldFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether values must be kept after ingestion
    pub fn is_retained(self) -> bool {
        self.intersects(FieldFlags::STORED | FieldFlags::SORT_OPTIMIZED)
    }
}

impl BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldFlags {
    fn bitor_assign(&mut self, rhs: FieldFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (FieldFlags::SEARCHABLE, "SEARCHABLE"),
            (FieldFlags::STORED, "STORED"),
            (FieldFlags::SORT_OPTIMIZED, "SORT_OPTIMIZED"),
            (FieldFlags::IN_ALL, "IN_ALL"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", set.join(" | "))
        }
    }
}

/// Computes a field value from the whole document
pub type ValueGenerator = Arc<dyn Fn(&Document) -> Option<Value> + Send + Sync>;

/// Resolved configuration for one field
#[derive(Clone)]
pub struct FieldConfig {
    pub flags: FieldFlags,
    pub analyzer: Option<Arc<dyn Analyzer>>,
    pub generator: Option<ValueGenerator>,
}

impl FieldConfig {
    pub fn new(flags: FieldFlags) -> Self {
        Self {
            flags,
            analyzer: None,
            generator: None,
        }
    }

    /// Default flags with word-segmented string values
    pub fn text(config: &TokenizerConfig) -> Self {
        Self::default().with_analyzer(Arc::new(TextAnalyzer::new(config)))
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Document) -> Option<Value> + Send + Sync + 'static,
    {
        self.generator = Some(Arc::new(generator));
        self
    }

    pub fn is_searchable(&self) -> bool {
        self.flags.contains(FieldFlags::SEARCHABLE)
    }

    pub fn is_stored(&self) -> bool {
        self.flags.contains(FieldFlags::STORED)
    }

    pub fn is_sort_optimized(&self) -> bool {
        self.flags.contains(FieldFlags::SORT_OPTIMIZED)
    }

    /// Stored or sort-optimized fields can back a sort clause
    pub fn is_sortable(&self) -> bool {
        self.flags.is_retained()
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self::new(FieldFlags::SEARCHABLE | FieldFlags::STORED | FieldFlags::IN_ALL)
    }
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("flags", &self.flags)
            .field("analyzer", &self.analyzer.as_ref().map(|a| a.name()))
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let flags = FieldFlags::SEARCHABLE | FieldFlags::SORT_OPTIMIZED;
        assert!(flags.contains(FieldFlags::SEARCHABLE));
        assert!(!flags.contains(FieldFlags::STORED));
        assert!(flags.is_retained());
        assert!(!FieldFlags::SEARCHABLE.is_retained());
        assert_eq!(format!("{:?}", flags), "SEARCHABLE | SORT_OPTIMIZED");
        assert_eq!(FieldFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn test_flags_serialize_as_number() {
        let json = serde_json::to_string(&(FieldFlags::STORED | FieldFlags::IN_ALL)).unwrap();
        assert_eq!(json, "10");
    }

    #[test]
    fn test_default_config_is_sortable() {
        let config = FieldConfig::default();
        assert!(config.is_searchable());
        assert!(config.is_sortable());
        assert!(!config.is_sort_optimized());
    }

    #[test]
    fn test_text_config_carries_analyzer() {
        let config = FieldConfig::text(&TokenizerConfig::default());
        assert_eq!(config.analyzer.as_ref().map(|a| a.name()), Some("text"));
        assert!(config.flags.contains(FieldFlags::IN_ALL));
    }
}
