//! Posting lists
//!
//! A term seen in one document is kept as a bare doc id and promoted to a
//! roaring bitmap on the second insert. Persisted form is one of:
//!
//! - the raw 4-byte little-endian doc id
//! - `RUN_TAG` followed by `(start, len)` pairs of little-endian u32, for
//!   postings made of a few long runs
//! - a serialized roaring bitmap, which starts with the portable-format
//!   cookie byte and is never 4 bytes

use roaring::RoaringBitmap;
use std::io;
use std::sync::Arc;

use crate::docset::DocIdSet;
use crate::models::DocId;

const RUN_TAG: u8 = b'R';

#[derive(Clone, Debug, PartialEq)]
pub enum Postings {
    Single(DocId),
    Many(Arc<RoaringBitmap>),
}

impl Postings {
    /// Add a doc id; ids arrive in ascending order from ingestion
    pub fn insert(&mut self, id: DocId) {
        match self {
            Postings::Single(existing) if *existing == id => {}
            Postings::Single(existing) => {
                let mut bitmap = RoaringBitmap::new();
                bitmap.insert(*existing);
                bitmap.insert(id);
                *self = Postings::Many(Arc::new(bitmap));
            }
            Postings::Many(bitmap) => {
                Arc::make_mut(bitmap).insert(id);
            }
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Postings::Single(_) => 1,
            Postings::Many(bitmap) => bitmap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_doc_set(&self) -> DocIdSet {
        match self {
            Postings::Single(id) => DocIdSet::Singleton(*id),
            Postings::Many(bitmap) => DocIdSet::from_shared(bitmap.clone()),
        }
    }

    /// Serialize for a persisted segment.
    ///
    /// roaring 0.10 has no run containers, so dense runs of ids are
    /// run-length encoded here whenever that is smaller than the bitmap.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        match self {
            Postings::Single(id) => Ok(id.to_le_bytes().to_vec()),
            Postings::Many(bitmap) => {
                let runs = runs(bitmap);
                if 1 + runs.len() * 8 < bitmap.serialized_size() {
                    let mut out = Vec::with_capacity(1 + runs.len() * 8);
                    out.push(RUN_TAG);
                    for (start, len) in runs {
                        out.extend_from_slice(&start.to_le_bytes());
                        out.extend_from_slice(&len.to_le_bytes());
                    }
                    return Ok(out);
                }
                let mut out = Vec::with_capacity(bitmap.serialized_size());
                bitmap.serialize_into(&mut out)?;
                Ok(out)
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() == 4 {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            return Ok(Postings::Single(DocId::from_le_bytes(buf)));
        }
        if bytes.first() == Some(&RUN_TAG) {
            return decode_runs(&bytes[1..]).map(|b| Postings::Many(Arc::new(b)));
        }
        let bitmap = RoaringBitmap::deserialize_from(bytes)?;
        Ok(Postings::Many(Arc::new(bitmap)))
    }

    /// Approximate in-memory footprint
    pub fn estimated_size(&self) -> usize {
        match self {
            Postings::Single(_) => 16,
            Postings::Many(bitmap) => bitmap.serialized_size() + 32,
        }
    }
}

/// Maximal runs of consecutive ids as `(start, len)`
fn runs(bitmap: &RoaringBitmap) -> Vec<(u32, u32)> {
    let mut out: Vec<(u32, u32)> = Vec::new();
    for id in bitmap.iter() {
        match out.last_mut() {
            Some((start, len)) if *start as u64 + *len as u64 == id as u64 => *len += 1,
            _ => out.push((id, 1)),
        }
    }
    out
}

fn decode_runs(bytes: &[u8]) -> io::Result<RoaringBitmap> {
    if bytes.is_empty() || bytes.len() % 8 != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated run postings"));
    }
    let mut bitmap = RoaringBitmap::new();
    for pair in bytes.chunks_exact(8) {
        let start = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let len = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        let last = len
            .checked_sub(1)
            .and_then(|n| start.checked_add(n))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad posting run"))?;
        bitmap.insert_range(start..=last);
    }
    Ok(bitmap)
}
