//! Typed columns for persisted segments
//!
//! When a segment is frozen, every field whose present values share one type
//! is pulled out of the generic record store into a column. Columns are
//! self-describing blobs: a leading kind byte followed by the column's own
//! metadata and values.

mod boolean;
mod numeric;
mod rank;
mod string;

pub use boolean::BooleanColumn;
pub use numeric::{NumericColumn, NumericValues};
pub use rank::RankColumn;
pub use string::{StringColumn, StringLayout};

use roaring::RoaringBitmap;
use std::io;

use crate::codec::varint::{read_prefixed, read_u8, write_prefixed};
use crate::models::Value;

const KIND_NUMERIC: u8 = 1;
const KIND_STRING: u8 = 2;
const KIND_BOOLEAN: u8 = 3;

#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(NumericColumn),
    String(StringColumn),
    Boolean(BooleanColumn),
}

impl Column {
    /// Build the most specific column for one field's values, indexed by
    /// doc-relative position. `None` when the values are not monomorphic.
    pub fn build(rows: &[Option<&Value>]) -> Option<Column> {
        let first = rows.iter().flatten().next()?;
        match first {
            Value::Int(_) | Value::Float(_) => NumericColumn::build(rows).map(Column::Numeric),
            Value::String(_) => StringColumn::build(rows).map(Column::String),
            Value::Bool(_) => BooleanColumn::build(rows).map(Column::Boolean),
            _ => None,
        }
    }

    pub fn get(&self, index: u32) -> Option<Value> {
        match self {
            Column::Numeric(c) => c.get(index),
            Column::String(c) => c.get(index).map(Value::from),
            Column::Boolean(c) => c.get(index).map(Value::Bool),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(c) => c.len(),
            Column::String(c) => c.len(),
            Column::Boolean(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::String(_) => "string",
            Column::Boolean(_) => "boolean",
        }
    }

    /// Approximate in-memory footprint, used by the decode cache
    pub fn estimated_size(&self) -> usize {
        match self {
            Column::Numeric(c) => c.estimated_size(),
            Column::String(c) => c.estimated_size(),
            Column::Boolean(c) => c.estimated_size(),
        }
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Column::Numeric(c) => {
                out.push(KIND_NUMERIC);
                c.serialize(&mut out)?;
            }
            Column::String(c) => {
                out.push(KIND_STRING);
                c.serialize(&mut out)?;
            }
            Column::Boolean(c) => {
                out.push(KIND_BOOLEAN);
                c.serialize(&mut out)?;
            }
        }
        Ok(out)
    }

    pub fn deserialize(data: &[u8]) -> io::Result<Column> {
        let mut pos = 0;
        let column = match read_u8(data, &mut pos)? {
            KIND_NUMERIC => Column::Numeric(NumericColumn::deserialize(data, &mut pos)?),
            KIND_STRING => Column::String(StringColumn::deserialize(data, &mut pos)?),
            KIND_BOOLEAN => Column::Boolean(BooleanColumn::deserialize(data, &mut pos)?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown column kind {}", other),
                ))
            }
        };
        if pos != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trailing bytes after column",
            ));
        }
        Ok(column)
    }
}

pub(crate) fn write_bitmap(bitmap: &RoaringBitmap, out: &mut Vec<u8>) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(bitmap.serialized_size());
    bitmap.serialize_into(&mut bytes)?;
    write_prefixed(&bytes, out);
    Ok(())
}

pub(crate) fn read_bitmap(input: &[u8], pos: &mut usize) -> io::Result<RoaringBitmap> {
    let bytes = read_prefixed(input, pos)?;
    RoaringBitmap::deserialize_from(bytes)
}
