//! Schema-driven record encoding
//!
//! A record is a sequence of `tag payload` pairs closed by tag 0.
//! Payloads by slot type:
//! - Boolean: one byte
//! - Numeric: marker byte (0 int, 1 float) then 8 little-endian bytes
//! - String / BufferValue: length-prefixed bytes
//! - arrays: element count then elements
//! - Child: nested record under the slot's child schema
//! - MixedArray: self-describing elements, objects use the child schema
//!
//! The overflow slot writes the field name followed by a self-describing value.

use std::io;

use super::schema::{Schema, Slot, SlotType, END_OF_RECORD};
use super::varint::{
    decode_len, decode_vbyte, encode_vbyte, read_prefixed, read_string, read_u64_le,
    read_u8, write_prefixed,
};
use crate::models::{Document, Value};

/// The current schema has no slot for a field value
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub field: String,
    pub kind: &'static str,
}

const NUM_INT: u8 = 0;
const NUM_FLOAT: u8 = 1;

// Self-describing value kinds
const K_NULL: u8 = 0;
const K_FALSE: u8 = 1;
const K_TRUE: u8 = 2;
const K_INT: u8 = 3;
const K_FLOAT: u8 = 4;
const K_STRING: u8 = 5;
const K_BYTES: u8 = 6;
const K_ARRAY: u8 = 7;
const K_OBJECT: u8 = 8;
const K_SCHEMA_OBJECT: u8 = 9;

/// Encode `doc` under `schema`, appending to `out`. On mismatch `out` may hold
/// a partial record; the caller rolls it back.
pub fn encode_record(schema: &mut Schema, doc: &Document, out: &mut Vec<u8>) -> Result<(), Mismatch> {
    for (name, value) in doc.iter() {
        if value.is_null() {
            continue;
        }
        match schema.find_slot_mut(name, value) {
            Some(slot) => {
                encode_vbyte(slot.tag as u64, out);
                encode_slot(slot, name, value, out)?;
            }
            None => match schema.overflow_tag() {
                Some(tag) if schema.budget_exhausted() => {
                    encode_vbyte(tag as u64, out);
                    write_prefixed(name.as_bytes(), out);
                    encode_generic(value, None, out)?;
                }
                _ => {
                    return Err(Mismatch {
                        field: name.clone(),
                        kind: value.kind(),
                    })
                }
            },
        }
    }
    encode_vbyte(END_OF_RECORD as u64, out);
    Ok(())
}

fn encode_number(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Float(f) => {
            out.push(NUM_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::Int(i) => {
            out.push(NUM_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        _ => {}
    }
}

fn encode_slot(slot: &mut Slot, name: &str, value: &Value, out: &mut Vec<u8>) -> Result<(), Mismatch> {
    let mismatch = || Mismatch {
        field: name.to_string(),
        kind: value.kind(),
    };
    match (slot.kind, value) {
        (SlotType::Boolean, Value::Bool(b)) => out.push(u8::from(*b)),
        (SlotType::Numeric, Value::Int(_) | Value::Float(_)) => {
            slot.numeric.observe(value);
            encode_number(value, out);
        }
        (SlotType::String, Value::String(s)) => write_prefixed(s.as_bytes(), out),
        (SlotType::BufferValue, Value::Bytes(b)) => write_prefixed(b, out),
        (SlotType::NumericArray, Value::Array(items)) => {
            encode_vbyte(items.len() as u64, out);
            for item in items {
                if !item.is_number() {
                    return Err(mismatch());
                }
                slot.numeric.observe(item);
                encode_number(item, out);
            }
        }
        (SlotType::StringArray, Value::Array(items)) => {
            encode_vbyte(items.len() as u64, out);
            for item in items {
                match item {
                    Value::String(s) => write_prefixed(s.as_bytes(), out),
                    _ => return Err(mismatch()),
                }
            }
        }
        (SlotType::Child, Value::Object(doc)) => {
            let child = slot.child.as_deref_mut().ok_or_else(mismatch)?;
            encode_record(child, doc, out)?;
        }
        (SlotType::ChildArray, Value::Array(items)) => {
            let child = slot.child.as_deref_mut().ok_or_else(mismatch)?;
            encode_vbyte(items.len() as u64, out);
            for item in items {
                match item {
                    Value::Object(doc) => encode_record(child, doc, out)?,
                    _ => return Err(mismatch()),
                }
            }
        }
        (SlotType::MixedArray, Value::Array(items)) => {
            let child = slot.child.as_deref_mut().ok_or_else(mismatch)?;
            encode_vbyte(items.len() as u64, out);
            for item in items {
                encode_generic(item, Some(&mut *child), out)?;
            }
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Self-describing encoding. Objects use `child` when given.
fn encode_generic(value: &Value, child: Option<&mut Schema>, out: &mut Vec<u8>) -> Result<(), Mismatch> {
    match value {
        Value::Null => out.push(K_NULL),
        Value::Bool(false) => out.push(K_FALSE),
        Value::Bool(true) => out.push(K_TRUE),
        Value::Int(i) => {
            out.push(K_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            out.push(K_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            out.push(K_STRING);
            write_prefixed(s.as_bytes(), out);
        }
        Value::Bytes(b) => {
            out.push(K_BYTES);
            write_prefixed(b, out);
        }
        Value::Array(items) => {
            out.push(K_ARRAY);
            encode_vbyte(items.len() as u64, out);
            let mut child = child;
            for item in items {
                encode_generic(item, child.as_deref_mut(), out)?;
            }
        }
        Value::Object(doc) => match child {
            Some(schema) => {
                out.push(K_SCHEMA_OBJECT);
                encode_record(schema, doc, out)?;
            }
            None => {
                out.push(K_OBJECT);
                encode_vbyte(doc.len() as u64, out);
                for (name, v) in doc.iter() {
                    write_prefixed(name.as_bytes(), out);
                    encode_generic(v, None, out)?;
                }
            }
        },
    }
    Ok(())
}

/// Decode one record starting at `pos`
pub fn decode_record(schema: &Schema, input: &[u8], pos: &mut usize) -> io::Result<Document> {
    let mut doc = Document::new();
    loop {
        let tag = u32::try_from(decode_vbyte(input, pos)?)
            .map_err(|_| invalid("tag out of range"))?;
        if tag == END_OF_RECORD {
            return Ok(doc);
        }
        if Some(tag) == schema.overflow_tag() {
            let name = read_string(input, pos)?;
            let value = decode_generic(None, input, pos)?;
            doc.insert(name, value);
            continue;
        }
        let (name, slot) = schema
            .slot_by_tag(tag)
            .ok_or_else(|| invalid(&format!("unknown slot tag {}", tag)))?;
        let value = decode_slot(slot, input, pos)?;
        doc.insert(name.to_string(), value);
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn decode_number(input: &[u8], pos: &mut usize) -> io::Result<Value> {
    let marker = read_u8(input, pos)?;
    let bits = read_u64_le(input, pos)?;
    match marker {
        NUM_INT => Ok(Value::Int(bits as i64)),
        NUM_FLOAT => Ok(Value::Float(f64::from_bits(bits))),
        other => Err(invalid(&format!("bad numeric marker {}", other))),
    }
}

fn child_schema(slot: &Slot) -> io::Result<&Schema> {
    slot.child
        .as_deref()
        .ok_or_else(|| invalid("slot without child schema"))
}

fn decode_slot(slot: &Slot, input: &[u8], pos: &mut usize) -> io::Result<Value> {
    Ok(match slot.kind {
        SlotType::Boolean => Value::Bool(read_u8(input, pos)? != 0),
        SlotType::Numeric => decode_number(input, pos)?,
        SlotType::String => Value::String(read_string(input, pos)?),
        SlotType::BufferValue => Value::Bytes(read_prefixed(input, pos)?.to_vec()),
        SlotType::NumericArray => {
            let n = decode_len(input, pos)?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(decode_number(input, pos)?);
            }
            Value::Array(items)
        }
        SlotType::StringArray => {
            let n = decode_len(input, pos)?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(Value::String(read_string(input, pos)?));
            }
            Value::Array(items)
        }
        SlotType::Child => Value::Object(decode_record(child_schema(slot)?, input, pos)?),
        SlotType::ChildArray => {
            let child = child_schema(slot)?;
            let n = decode_len(input, pos)?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(Value::Object(decode_record(child, input, pos)?));
            }
            Value::Array(items)
        }
        SlotType::MixedArray => {
            let child = child_schema(slot)?;
            let n = decode_len(input, pos)?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(decode_generic(Some(child), input, pos)?);
            }
            Value::Array(items)
        }
    })
}

fn decode_generic(child: Option<&Schema>, input: &[u8], pos: &mut usize) -> io::Result<Value> {
    let kind = read_u8(input, pos)?;
    Ok(match kind {
        K_NULL => Value::Null,
        K_FALSE => Value::Bool(false),
        K_TRUE => Value::Bool(true),
        K_INT => Value::Int(read_u64_le(input, pos)? as i64),
        K_FLOAT => Value::Float(f64::from_bits(read_u64_le(input, pos)?)),
        K_STRING => Value::String(read_string(input, pos)?),
        K_BYTES => Value::Bytes(read_prefixed(input, pos)?.to_vec()),
        K_ARRAY => {
            let n = decode_len(input, pos)?;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(decode_generic(child, input, pos)?);
            }
            Value::Array(items)
        }
        K_OBJECT => {
            let n = decode_len(input, pos)?;
            let mut doc = Document::new();
            for _ in 0..n {
                let name = read_string(input, pos)?;
                doc.insert(name, decode_generic(None, input, pos)?);
            }
            Value::Object(doc)
        }
        K_SCHEMA_OBJECT => {
            let schema = child.ok_or_else(|| invalid("schema object outside mixed array"))?;
            Value::Object(decode_record(schema, input, pos)?)
        }
        other => return Err(invalid(&format!("bad value kind {}", other))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(schema: &mut Schema, doc: &Document) -> Document {
        let mut buf = Vec::new();
        if encode_record(schema, doc, &mut buf).is_err() {
            buf.clear();
            schema.learn(doc);
            encode_record(schema, doc, &mut buf).unwrap();
        }
        let mut pos = 0;
        let back = decode_record(schema, &buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        back
    }

    #[test]
    fn test_mismatch_on_unknown_field() {
        let mut schema = Schema::new();
        let doc = Document::new().with("a", 1);
        let err = encode_record(&mut schema, &doc, &mut Vec::new()).unwrap_err();
        assert_eq!(err.field, "a");
        assert_eq!(err.kind, "int");
    }

    #[test]
    fn test_roundtrip_all_slot_types() {
        let mut schema = Schema::new();
        let mut doc = Document::from_json(json!({
            "flag": true,
            "n": 42,
            "x": 2.5,
            "s": "hello",
            "nums": [1, 2.5, -3],
            "strs": ["a", "b"],
            "empty": [],
            "user": {"name": "ann", "tags": ["x"]},
            "items": [{"sku": "a", "qty": 1}, {"sku": "b"}],
            "mixed": [1, "two", null, {"k": false}, [3, 4]]
        }))
        .unwrap();
        doc.insert("blob", Value::Bytes(vec![0, 1, 255]));
        assert_eq!(roundtrip(&mut schema, &doc), doc);
    }

    #[test]
    fn test_int_and_float_stay_distinct() {
        let mut schema = Schema::new();
        let doc = Document::new().with("a", Value::Float(3.0));
        assert_eq!(roundtrip(&mut schema, &doc), doc);
        let doc = Document::new().with("a", Value::Int(3));
        assert_eq!(roundtrip(&mut schema, &doc), doc);
    }

    #[test]
    fn test_overflow_fields_roundtrip() {
        let mut schema = Schema::with_budget(1);
        let doc = Document::from_json(json!({"a": 1, "b": {"c": [1, "x"]}, "d": "z"})).unwrap();
        assert_eq!(roundtrip(&mut schema, &doc), doc);
        assert!(schema.overflow_tag().is_some());
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let schema = Schema::new();
        let mut pos = 0;
        assert!(decode_record(&schema, &[0x85], &mut pos).is_err());
    }
}
