//! Numeric columns
//!
//! Integers are stored in the narrowest of i8/i16/i32/i64 that fits every
//! value, floats as f32 when lossless and f64 otherwise. Sparse columns keep
//! a presence bitmap and pack only the present values.

use roaring::RoaringBitmap;
use std::io;

use super::{read_bitmap, write_bitmap};
use crate::codec::varint::{decode_len, encode_vbyte, read_bytes};
use crate::models::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum NumericValues {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl NumericValues {
    fn tag(&self) -> u8 {
        match self {
            NumericValues::I8(_) => 0,
            NumericValues::I16(_) => 1,
            NumericValues::I32(_) => 2,
            NumericValues::I64(_) => 3,
            NumericValues::F32(_) => 4,
            NumericValues::F64(_) => 5,
        }
    }

    fn width(&self) -> usize {
        match self {
            NumericValues::I8(_) => 1,
            NumericValues::I16(_) => 2,
            NumericValues::I32(_) | NumericValues::F32(_) => 4,
            NumericValues::I64(_) | NumericValues::F64(_) => 8,
        }
    }

    fn len(&self) -> usize {
        match self {
            NumericValues::I8(v) => v.len(),
            NumericValues::I16(v) => v.len(),
            NumericValues::I32(v) => v.len(),
            NumericValues::I64(v) => v.len(),
            NumericValues::F32(v) => v.len(),
            NumericValues::F64(v) => v.len(),
        }
    }

    fn get(&self, i: usize) -> Option<Value> {
        Some(match self {
            NumericValues::I8(v) => Value::Int(*v.get(i)? as i64),
            NumericValues::I16(v) => Value::Int(*v.get(i)? as i64),
            NumericValues::I32(v) => Value::Int(*v.get(i)? as i64),
            NumericValues::I64(v) => Value::Int(*v.get(i)?),
            NumericValues::F32(v) => Value::Float(*v.get(i)? as f64),
            NumericValues::F64(v) => Value::Float(*v.get(i)?),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumericColumn {
    len: u32,
    presence: Option<RoaringBitmap>,
    values: NumericValues,
}

impl NumericColumn {
    /// Build from per-document values. Returns `None` unless every present
    /// value is an integer, or every present value is a float.
    pub fn build(rows: &[Option<&Value>]) -> Option<Self> {
        let mut presence = RoaringBitmap::new();
        let mut ints = Vec::new();
        let mut floats = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match row {
                Some(Value::Int(v)) => {
                    ints.push(*v);
                    presence.insert(i as u32);
                }
                Some(Value::Float(v)) => {
                    floats.push(*v);
                    presence.insert(i as u32);
                }
                Some(_) => return None,
                None => {}
            }
        }
        if presence.is_empty() || (!ints.is_empty() && !floats.is_empty()) {
            return None;
        }

        let values = if floats.is_empty() {
            narrow_ints(ints)
        } else if floats.iter().all(|f| (*f as f32) as f64 == *f || f.is_nan()) {
            NumericValues::F32(floats.into_iter().map(|f| f as f32).collect())
        } else {
            NumericValues::F64(floats)
        };

        let len = rows.len() as u32;
        let presence = (presence.len() < len as u64).then_some(presence);
        Some(Self {
            len,
            presence,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_sparse(&self) -> bool {
        self.presence.is_some()
    }

    pub fn values(&self) -> &NumericValues {
        &self.values
    }

    /// Value at a doc-relative index
    pub fn get(&self, index: u32) -> Option<Value> {
        match &self.presence {
            Some(presence) => {
                if !presence.contains(index) {
                    return None;
                }
                let packed = presence.rank(index) as usize - 1;
                self.values.get(packed)
            }
            None => self.values.get(index as usize),
        }
    }

    pub fn estimated_size(&self) -> usize {
        self.values.len() * self.values.width()
            + self.presence.as_ref().map_or(0, |p| p.serialized_size())
            + 32
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.push(self.values.tag());
        encode_vbyte(self.len as u64, out);
        match &self.presence {
            Some(presence) => {
                out.push(1);
                write_bitmap(presence, out)?;
            }
            None => out.push(0),
        }
        encode_vbyte(self.values.len() as u64, out);
        match &self.values {
            NumericValues::I8(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            NumericValues::I16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            NumericValues::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            NumericValues::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            NumericValues::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            NumericValues::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
        Ok(())
    }

    pub fn deserialize(input: &[u8], pos: &mut usize) -> io::Result<Self> {
        let tag = read_bytes(input, pos, 1)?[0];
        let len = u32::try_from(decode_len(input, pos)?)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "column too long"))?;
        let presence = match read_bytes(input, pos, 1)?[0] {
            0 => None,
            _ => Some(read_bitmap(input, pos)?),
        };
        let count = decode_len(input, pos)?;

        macro_rules! read_vec {
            ($ty:ty, $width:expr) => {{
                let bytes = read_bytes(input, pos, count.saturating_mul($width))?;
                bytes
                    .chunks_exact($width)
                    .map(|c| {
                        let mut buf = [0u8; $width];
                        buf.copy_from_slice(c);
                        <$ty>::from_le_bytes(buf)
                    })
                    .collect::<Vec<$ty>>()
            }};
        }

        let values = match tag {
            0 => NumericValues::I8(read_vec!(i8, 1)),
            1 => NumericValues::I16(read_vec!(i16, 2)),
            2 => NumericValues::I32(read_vec!(i32, 4)),
            3 => NumericValues::I64(read_vec!(i64, 8)),
            4 => NumericValues::F32(read_vec!(f32, 4)),
            5 => NumericValues::F64(read_vec!(f64, 8)),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown numeric column kind {}", other),
                ))
            }
        };

        let expected = presence.as_ref().map_or(len as u64, |p| p.len());
        if values.len() as u64 != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "numeric column value count mismatch",
            ));
        }
        Ok(Self {
            len,
            presence,
            values,
        })
    }
}

fn narrow_ints(ints: Vec<i64>) -> NumericValues {
    let min = ints.iter().copied().min().unwrap_or(0);
    let max = ints.iter().copied().max().unwrap_or(0);
    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        NumericValues::I8(ints.into_iter().map(|v| v as i8).collect())
    } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        NumericValues::I16(ints.into_iter().map(|v| v as i16).collect())
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        NumericValues::I32(ints.into_iter().map(|v| v as i32).collect())
    } else {
        NumericValues::I64(ints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Option<Value>]) -> Option<NumericColumn> {
        let rows: Vec<Option<&Value>> = values.iter().map(Option::as_ref).collect();
        NumericColumn::build(&rows)
    }

    fn roundtrip(col: &NumericColumn) -> NumericColumn {
        let mut buf = Vec::new();
        col.serialize(&mut buf).unwrap();
        let mut pos = 0;
        let back = NumericColumn::deserialize(&buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        back
    }

    #[test]
    fn test_narrowest_width() {
        let col = build(&[Some(Value::Int(1)), Some(Value::Int(-100))]).unwrap();
        assert!(matches!(col.values(), NumericValues::I8(_)));
        let col = build(&[Some(Value::Int(1)), Some(Value::Int(40_000))]).unwrap();
        assert!(matches!(col.values(), NumericValues::I32(_)));
        let col = build(&[Some(Value::Int(1 << 40))]).unwrap();
        assert!(matches!(col.values(), NumericValues::I64(_)));
        let col = build(&[Some(Value::Float(0.5))]).unwrap();
        assert!(matches!(col.values(), NumericValues::F32(_)));
        let col = build(&[Some(Value::Float(0.1))]).unwrap();
        assert!(matches!(col.values(), NumericValues::F64(_)));
    }

    #[test]
    fn test_rejects_mixed_types() {
        assert!(build(&[Some(Value::Int(1)), Some(Value::Float(1.5))]).is_none());
        assert!(build(&[Some(Value::Int(1)), Some(Value::from("x"))]).is_none());
        assert!(build(&[None, None]).is_none());
    }

    #[test]
    fn test_sparse_column() {
        let col = build(&[None, Some(Value::Int(7)), None, Some(Value::Int(-3))]).unwrap();
        assert!(col.is_sparse());
        let col = roundtrip(&col);
        assert_eq!(col.get(0), None);
        assert_eq!(col.get(1), Some(Value::Int(7)));
        assert_eq!(col.get(2), None);
        assert_eq!(col.get(3), Some(Value::Int(-3)));
        assert_eq!(col.get(4), None);
    }

    #[test]
    fn test_dense_roundtrip() {
        let col = build(&[Some(Value::Float(2.25)), Some(Value::Float(-1.0))]).unwrap();
        assert!(!col.is_sparse());
        let col = roundtrip(&col);
        assert_eq!(col.get(0), Some(Value::Float(2.25)));
        assert_eq!(col.get(1), Some(Value::Float(-1.0)));
        assert_eq!(col.len(), 2);
    }
}
