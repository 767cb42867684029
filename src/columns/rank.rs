//! Rank columns for sort-optimized fields
//!
//! Each doc stores the 1-based rank of its value among the segment's
//! distinct values; 0 marks a missing value. Comparing ranks within one
//! segment orders docs exactly like comparing their values.

use std::collections::BTreeSet;
use std::io;

use crate::codec::bitpack::{bitpack_decode, bitpack_encode};
use crate::codec::varint::{decode_len, encode_vbyte};
use crate::models::{Value, ValueKey};

pub const MISSING_RANK: u32 = 0;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankColumn {
    ranks: Vec<u32>,
}

impl RankColumn {
    pub fn build(rows: &[Option<&Value>]) -> Self {
        let distinct: BTreeSet<ValueKey> = rows
            .iter()
            .flatten()
            .map(|v| ValueKey((*v).clone()))
            .collect();
        let ordered: Vec<ValueKey> = distinct.into_iter().collect();
        let ranks = rows
            .iter()
            .map(|row| match row {
                Some(v) => ordered
                    .binary_search_by(|probe| probe.0.total_cmp(v))
                    .map_or(MISSING_RANK, |i| i as u32 + 1),
                None => MISSING_RANK,
            })
            .collect();
        Self { ranks }
    }

    /// Rank at a doc-relative index; `None` when the doc has no value
    pub fn get(&self, index: u32) -> Option<u32> {
        match self.ranks.get(index as usize) {
            Some(&MISSING_RANK) | None => None,
            Some(&rank) => Some(rank),
        }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn estimated_size(&self) -> usize {
        self.ranks.len() * 4 + 24
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_vbyte(self.ranks.len() as u64, &mut out);
        bitpack_encode(&self.ranks, &mut out);
        out
    }

    pub fn deserialize(data: &[u8]) -> io::Result<Self> {
        let mut pos = 0;
        let count = decode_len(data, &mut pos)?;
        let ranks = bitpack_decode(data, &mut pos, count)?;
        Ok(Self { ranks })
    }
}
