//! Adaptive record schema
//!
//! A schema level maps field names to one or more typed slots. Each slot
//! owns a small integer tag written before the field's payload. Child,
//! ChildArray and MixedArray slots carry a nested schema for the objects
//! they contain. When a level runs out of explicit slots, unknown fields
//! are written to a single overflow slot that carries the field name inline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Document, Value};

/// Tag 0 terminates a record
pub const END_OF_RECORD: u32 = 0;

/// Explicit slots per schema level before fields overflow
pub const DEFAULT_SLOT_BUDGET: u32 = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    Boolean,
    Numeric,
    NumericArray,
    String,
    StringArray,
    Child,
    ChildArray,
    BufferValue,
    MixedArray,
}

impl SlotType {
    /// Slot type that holds `value`; `None` for null and empty arrays,
    /// which need special handling.
    pub fn for_value(value: &Value) -> Option<SlotType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(SlotType::Boolean),
            Value::Int(_) | Value::Float(_) => Some(SlotType::Numeric),
            Value::String(_) => Some(SlotType::String),
            Value::Bytes(_) => Some(SlotType::BufferValue),
            Value::Object(_) => Some(SlotType::Child),
            Value::Array(items) if items.is_empty() => None,
            Value::Array(items) => {
                if items.iter().all(Value::is_number) {
                    Some(SlotType::NumericArray)
                } else if items.iter().all(|v| matches!(v, Value::String(_))) {
                    Some(SlotType::StringArray)
                } else if items.iter().all(|v| matches!(v, Value::Object(_))) {
                    Some(SlotType::ChildArray)
                } else {
                    Some(SlotType::MixedArray)
                }
            }
        }
    }

    pub fn is_array(self) -> bool {
        matches!(
            self,
            SlotType::NumericArray | SlotType::StringArray | SlotType::ChildArray | SlotType::MixedArray
        )
    }

    pub fn has_child(self) -> bool {
        matches!(self, SlotType::Child | SlotType::ChildArray | SlotType::MixedArray)
    }
}

/// Observed numeric value properties
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumericFlags(u8);

impl NumericFlags {
    pub const SIGNED: NumericFlags = NumericFlags(1);
    /// Needs more than 32 bits
    pub const WIDE: NumericFlags = NumericFlags(1 << 1);
    pub const FLOAT: NumericFlags = NumericFlags(1 << 2);

    pub fn contains(self, other: NumericFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn observe(&mut self, value: &Value) {
        match value {
            Value::Int(i) => {
                if *i < 0 {
                    self.0 |= Self::SIGNED.0;
                }
                if *i > u32::MAX as i64 || *i < i32::MIN as i64 {
                    self.0 |= Self::WIDE.0;
                }
            }
            Value::Float(f) => {
                self.0 |= Self::FLOAT.0;
                if *f < 0.0 {
                    self.0 |= Self::SIGNED.0;
                }
            }
            _ => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub tag: u32,
    pub kind: SlotType,
    #[serde(default)]
    pub numeric: NumericFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<Schema>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSlots {
    pub name: String,
    pub slots: Vec<Slot>,
}

/// One level of the record schema tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSlots>,
    next_tag: u32,
    slot_budget: u32,
    overflow_tag: Option<u32>,
    /// Bumped whenever this level or a nested level grows
    version: u32,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
    #[serde(skip)]
    by_tag: HashMap<u32, (usize, usize)>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::with_budget(DEFAULT_SLOT_BUDGET)
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(slot_budget: u32) -> Self {
        Self {
            fields: Vec::new(),
            next_tag: 1,
            slot_budget,
            overflow_tag: None,
            version: 0,
            by_name: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn fields(&self) -> &[FieldSlots] {
        &self.fields
    }

    pub fn overflow_tag(&self) -> Option<u32> {
        self.overflow_tag
    }

    fn explicit_slots(&self) -> u32 {
        self.next_tag - 1 - u32::from(self.overflow_tag.is_some())
    }

    pub fn budget_exhausted(&self) -> bool {
        self.explicit_slots() >= self.slot_budget
    }

    /// Rebuild lookup tables after deserialization
    pub fn reindex(&mut self) {
        self.by_name.clear();
        self.by_tag.clear();
        for (fi, field) in self.fields.iter_mut().enumerate() {
            self.by_name.insert(field.name.clone(), fi);
            for (si, slot) in field.slots.iter_mut().enumerate() {
                self.by_tag.insert(slot.tag, (fi, si));
                if let Some(child) = slot.child.as_mut() {
                    child.reindex();
                }
            }
        }
    }

    /// Slot able to hold `value` for `name`
    pub fn find_slot(&self, name: &str, value: &Value) -> Option<&Slot> {
        let field = &self.fields[*self.by_name.get(name)?];
        match SlotType::for_value(value) {
            Some(kind) => field.slots.iter().find(|s| s.kind == kind),
            None => field.slots.iter().find(|s| s.kind.is_array()),
        }
    }

    pub(crate) fn find_slot_mut(&mut self, name: &str, value: &Value) -> Option<&mut Slot> {
        let fi = *self.by_name.get(name)?;
        let field = &mut self.fields[fi];
        match SlotType::for_value(value) {
            Some(kind) => field.slots.iter_mut().find(|s| s.kind == kind),
            None => field.slots.iter_mut().find(|s| s.kind.is_array()),
        }
    }

    /// Field name and slot for a tag
    pub fn slot_by_tag(&self, tag: u32) -> Option<(&str, &Slot)> {
        let (fi, si) = *self.by_tag.get(&tag)?;
        let field = &self.fields[fi];
        Some((field.name.as_str(), &field.slots[si]))
    }

    /// Extend the schema so every field of `doc` has a compatible slot.
    /// Returns true if anything was added.
    pub fn learn(&mut self, doc: &Document) -> bool {
        let mut grew = false;
        for (name, value) in doc.iter() {
            grew |= self.learn_value(name, value);
        }
        if grew {
            self.version += 1;
        }
        grew
    }

    fn learn_value(&mut self, name: &str, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        let mut grew = false;
        if self.find_slot(name, value).is_none() {
            if self.budget_exhausted() {
                if self.overflow_tag.is_none() {
                    self.overflow_tag = Some(self.next_tag);
                    self.next_tag += 1;
                    return true;
                }
                return false;
            }
            let kind = SlotType::for_value(value).unwrap_or(SlotType::MixedArray);
            self.add_slot(name, kind);
            grew = true;
        }
        if let Some(child) = self
            .find_slot_mut(name, value)
            .and_then(|slot| slot.child.as_mut())
        {
            grew |= learn_nested(child, value);
        }
        grew
    }

    fn add_slot(&mut self, name: &str, kind: SlotType) {
        let tag = self.next_tag;
        self.next_tag += 1;
        let child = kind
            .has_child()
            .then(|| Box::new(Schema::with_budget(self.slot_budget)));
        let slot = Slot {
            tag,
            kind,
            numeric: NumericFlags::default(),
            child,
        };
        let fi = match self.by_name.get(name) {
            Some(&fi) => fi,
            None => {
                self.fields.push(FieldSlots {
                    name: name.to_string(),
                    slots: Vec::new(),
                });
                let fi = self.fields.len() - 1;
                self.by_name.insert(name.to_string(), fi);
                fi
            }
        };
        self.fields[fi].slots.push(slot);
        let si = self.fields[fi].slots.len() - 1;
        self.by_tag.insert(tag, (fi, si));
    }
}

/// Learn the objects nested inside `value` into a slot's child schema
fn learn_nested(child: &mut Schema, value: &Value) -> bool {
    match value {
        Value::Object(doc) => child.learn(doc),
        Value::Array(items) => {
            let mut grew = false;
            for item in items {
                grew |= learn_nested(child, item);
            }
            grew
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        Document::from_json(v).unwrap()
    }

    #[test]
    fn test_slot_types() {
        assert_eq!(SlotType::for_value(&Value::Int(1)), Some(SlotType::Numeric));
        assert_eq!(
            SlotType::for_value(&Value::Array(vec![Value::Int(1), Value::Float(2.0)])),
            Some(SlotType::NumericArray)
        );
        assert_eq!(
            SlotType::for_value(&Value::Array(vec![Value::Int(1), Value::from("a")])),
            Some(SlotType::MixedArray)
        );
        assert_eq!(SlotType::for_value(&Value::Array(vec![])), None);
    }

    #[test]
    fn test_learn_assigns_tags_per_type() {
        let mut schema = Schema::new();
        assert!(schema.learn(&doc(json!({"a": 1, "b": "x"}))));
        assert!(!schema.learn(&doc(json!({"a": 2, "b": "y"}))));
        assert!(schema.learn(&doc(json!({"a": "now a string"}))));

        let a = schema.fields().iter().find(|f| f.name == "a").unwrap();
        assert_eq!(a.slots.len(), 2);
        assert_ne!(a.slots[0].tag, a.slots[1].tag);
        assert!(a.slots.iter().all(|s| s.tag != END_OF_RECORD));
    }

    #[test]
    fn test_learn_nested_children() {
        let mut schema = Schema::new();
        schema.learn(&doc(json!({"user": {"name": "ann"}, "items": [{"sku": "a"}]})));
        let user = schema.find_slot("user", &Value::Object(Document::new())).unwrap();
        assert_eq!(user.kind, SlotType::Child);
        assert_eq!(user.child.as_ref().unwrap().fields().len(), 1);
    }

    #[test]
    fn test_budget_overflow() {
        let mut schema = Schema::with_budget(2);
        schema.learn(&doc(json!({"a": 1, "b": 2, "c": 3, "d": 4})));
        assert!(schema.budget_exhausted());
        assert!(schema.overflow_tag().is_some());
        assert!(schema.find_slot("c", &Value::Int(3)).is_none());
    }

    #[test]
    fn test_serde_then_reindex() {
        let mut schema = Schema::new();
        schema.learn(&doc(json!({"a": 1, "n": {"b": true}})));
        let json = serde_json::to_vec(&schema).unwrap();
        let mut back: Schema = serde_json::from_slice(&json).unwrap();
        back.reindex();
        assert_eq!(back, schema);
        assert!(back.find_slot("a", &Value::Int(9)).is_some());
    }
}
