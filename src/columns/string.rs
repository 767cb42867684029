//! String columns
//!
//! Three layouts, picked after all values are seen:
//! - dense fixed: every doc has a value and all values share one byte length
//! - dense variable: every doc has a value, per-value lengths are bitpacked
//! - sparse variable: a presence bitmap plus lengths for present docs only

use roaring::RoaringBitmap;
use std::io;

use super::{read_bitmap, write_bitmap};
use crate::codec::bitpack::{bitpack_decode, bitpack_encode};
use crate::codec::varint::{decode_len, encode_vbyte, read_bytes, read_u8};
use crate::models::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringLayout {
    DenseFixed { width: u32 },
    DenseVariable,
    SparseVariable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StringColumn {
    len: u32,
    layout: StringLayout,
    presence: Option<RoaringBitmap>,
    /// End offset of each packed value; empty for the fixed layout
    ends: Vec<u32>,
    data: Vec<u8>,
}

impl StringColumn {
    pub fn build(rows: &[Option<&Value>]) -> Option<Self> {
        let mut presence = RoaringBitmap::new();
        let mut data = Vec::new();
        let mut ends = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match row {
                Some(Value::String(s)) => {
                    presence.insert(i as u32);
                    data.extend_from_slice(s.as_bytes());
                    ends.push(u32::try_from(data.len()).ok()?);
                }
                Some(_) => return None,
                None => {}
            }
        }
        if presence.is_empty() {
            return None;
        }

        let len = rows.len() as u32;
        let dense = presence.len() == len as u64;
        let width = ends.first().copied().unwrap_or(0);
        let fixed = ends
            .iter()
            .enumerate()
            .all(|(i, &end)| end as u64 == width as u64 * (i as u64 + 1));

        let (layout, presence, ends) = if dense && fixed {
            (StringLayout::DenseFixed { width }, None, Vec::new())
        } else if dense {
            (StringLayout::DenseVariable, None, ends)
        } else {
            (StringLayout::SparseVariable, Some(presence), ends)
        };
        Some(Self {
            len,
            layout,
            presence,
            ends,
            data,
        })
    }

    pub fn layout(&self) -> StringLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        if index >= self.len {
            return None;
        }
        let packed = match &self.presence {
            Some(presence) => {
                if !presence.contains(index) {
                    return None;
                }
                presence.rank(index) as usize - 1
            }
            None => index as usize,
        };
        let (start, end) = match self.layout {
            StringLayout::DenseFixed { width } => {
                let start = packed * width as usize;
                (start, start + width as usize)
            }
            _ => {
                let end = *self.ends.get(packed)? as usize;
                let start = if packed == 0 {
                    0
                } else {
                    self.ends[packed - 1] as usize
                };
                (start, end)
            }
        };
        // Values were valid UTF-8 on the way in, and boundaries fall on value edges
        std::str::from_utf8(self.data.get(start..end)?).ok()
    }

    pub fn estimated_size(&self) -> usize {
        self.data.len()
            + self.ends.len() * 4
            + self.presence.as_ref().map_or(0, |p| p.serialized_size())
            + 48
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()> {
        encode_vbyte(self.len as u64, out);
        match self.layout {
            StringLayout::DenseFixed { width } => {
                out.push(0);
                encode_vbyte(width as u64, out);
            }
            StringLayout::DenseVariable => out.push(1),
            StringLayout::SparseVariable => out.push(2),
        }
        if let Some(presence) = &self.presence {
            write_bitmap(presence, out)?;
        }
        if !matches!(self.layout, StringLayout::DenseFixed { .. }) {
            let mut lengths = Vec::with_capacity(self.ends.len());
            let mut prev = 0;
            for &end in &self.ends {
                lengths.push(end - prev);
                prev = end;
            }
            encode_vbyte(lengths.len() as u64, out);
            bitpack_encode(&lengths, out);
        }
        encode_vbyte(self.data.len() as u64, out);
        out.extend_from_slice(&self.data);
        Ok(())
    }

    pub fn deserialize(input: &[u8], pos: &mut usize) -> io::Result<Self> {
        let len = u32::try_from(decode_len(input, pos)?)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "column too long"))?;
        let layout = match read_u8(input, pos)? {
            0 => {
                let width = u32::try_from(decode_len(input, pos)?).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "string width overflow")
                })?;
                StringLayout::DenseFixed { width }
            }
            1 => StringLayout::DenseVariable,
            2 => StringLayout::SparseVariable,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown string layout {}", other),
                ))
            }
        };
        let presence = match layout {
            StringLayout::SparseVariable => Some(read_bitmap(input, pos)?),
            _ => None,
        };
        let mut ends = Vec::new();
        if !matches!(layout, StringLayout::DenseFixed { .. }) {
            let count = decode_len(input, pos)?;
            let lengths = bitpack_decode(input, pos, count)?;
            let mut end = 0u32;
            for length in lengths {
                end = end.checked_add(length).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "string offsets overflow")
                })?;
                ends.push(end);
            }
        }
        let data_len = decode_len(input, pos)?;
        let data = read_bytes(input, pos, data_len)?.to_vec();

        let expected_values = presence.as_ref().map_or(len as u64, |p| p.len());
        let consistent = match layout {
            StringLayout::DenseFixed { width } => {
                width as u64 * expected_values == data.len() as u64
            }
            _ => {
                ends.len() as u64 == expected_values
                    && ends.last().map_or(0, |&e| e as usize) == data.len()
            }
        };
        if !consistent {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "string column layout mismatch",
            ));
        }

        Ok(Self {
            len,
            layout,
            presence,
            ends,
            data,
        })
    }
}
