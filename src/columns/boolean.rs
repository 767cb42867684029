//! Boolean columns: a bitmap of true docs plus an optional presence bitmap

use roaring::RoaringBitmap;
use std::io;

use super::{read_bitmap, write_bitmap};
use crate::codec::varint::{decode_len, encode_vbyte, read_u8};
use crate::models::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct BooleanColumn {
    len: u32,
    trues: RoaringBitmap,
    presence: Option<RoaringBitmap>,
}

impl BooleanColumn {
    pub fn build(rows: &[Option<&Value>]) -> Option<Self> {
        let mut trues = RoaringBitmap::new();
        let mut presence = RoaringBitmap::new();
        for (i, row) in rows.iter().enumerate() {
            match row {
                Some(Value::Bool(b)) => {
                    presence.insert(i as u32);
                    if *b {
                        trues.insert(i as u32);
                    }
                }
                Some(_) => return None,
                None => {}
            }
        }
        if presence.is_empty() {
            return None;
        }
        let len = rows.len() as u32;
        Some(Self {
            len,
            trues,
            presence: (presence.len() < len as u64).then_some(presence),
        })
    }

    pub fn get(&self, index: u32) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        match &self.presence {
            Some(presence) if !presence.contains(index) => None,
            _ => Some(self.trues.contains(index)),
        }
    }

    pub fn true_docs(&self) -> &RoaringBitmap {
        &self.trues
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn estimated_size(&self) -> usize {
        self.trues.serialized_size()
            + self.presence.as_ref().map_or(0, |p| p.serialized_size())
            + 32
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> io::Result<()> {
        encode_vbyte(self.len as u64, out);
        write_bitmap(&self.trues, out)?;
        match &self.presence {
            Some(presence) => {
                out.push(1);
                write_bitmap(presence, out)
            }
            None => {
                out.push(0);
                Ok(())
            }
        }
    }

    pub fn deserialize(input: &[u8], pos: &mut usize) -> io::Result<Self> {
        let len = u32::try_from(decode_len(input, pos)?)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "column too long"))?;
        let trues = read_bitmap(input, pos)?;
        let presence = match read_u8(input, pos)? {
            0 => None,
            _ => Some(read_bitmap(input, pos)?),
        };
        Ok(Self {
            len,
            trues,
            presence,
        })
    }
}
