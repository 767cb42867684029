//! Field configuration
//!
//! - Field flags (SEARCHABLE, STORED, SORT_OPTIMIZED, IN_ALL)
//! - Per-field analyzer and derived-value generator
//! - The index-wide field registry and its virtual fields

mod field_type;
mod mapping;

pub use field_type::{FieldConfig, FieldFlags, ValueGenerator};
pub use mapping::{FieldRegistry, ALL_FIELD, FIELDS_PRESENT};
