//! Append-only packed record store

use serde::{Deserialize, Serialize};
use std::io;
use tracing::debug;

use super::record::{decode_record, encode_record};
use super::schema::Schema;
use crate::error::{QuarryError, Result};
use crate::models::Document;

/// Documents packed into one buffer under a shared, growing schema.
///
/// Records are addressed by insertion index. A failed add only rolls back
/// the record in progress; earlier records stay readable.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    schema: Schema,
    buffer: Vec<u8>,
    offsets: Vec<u64>,
}

/// Persisted form of a store's pointer index
#[derive(Serialize, Deserialize)]
struct PointerIndex {
    offsets: Vec<u64>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    /// Append a document, growing the schema if needed. Returns its index.
    pub fn add(&mut self, doc: &Document) -> Result<usize> {
        let start = self.buffer.len();
        if let Err(mismatch) = encode_record(&mut self.schema, doc, &mut self.buffer) {
            self.buffer.truncate(start);
            self.schema.learn(doc);
            debug!(
                field = %mismatch.field,
                kind = mismatch.kind,
                version = self.schema.version(),
                "record schema extended"
            );
            if let Err(again) = encode_record(&mut self.schema, doc, &mut self.buffer) {
                self.buffer.truncate(start);
                return Err(QuarryError::Schema(format!(
                    "no slot for field '{}' of type {} after schema extension",
                    again.field, again.kind
                )));
            }
        }
        self.offsets.push(start as u64);
        Ok(self.offsets.len() - 1)
    }

    pub fn get(&self, index: usize) -> Result<Document> {
        let bytes = self.record_bytes(index).ok_or_else(|| {
            QuarryError::Internal(format!("record {} out of range ({})", index, self.len()))
        })?;
        let mut pos = 0;
        Ok(decode_record(&self.schema, bytes, &mut pos)?)
    }

    /// Raw encoded bytes of one record
    pub fn record_bytes(&self, index: usize) -> Option<&[u8]> {
        let start = *self.offsets.get(index)? as usize;
        let end = self
            .offsets
            .get(index + 1)
            .map_or(self.buffer.len(), |&e| e as usize);
        self.buffer.get(start..end)
    }

    /// Drop records from `len` onwards
    pub fn truncate(&mut self, len: usize) {
        if let Some(&start) = self.offsets.get(len) {
            self.buffer.truncate(start as usize);
            self.offsets.truncate(len);
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn size_bytes(&self) -> usize {
        self.buffer.len() + self.offsets.len() * 8
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Serialized pointer index for persistence
    pub fn encode_pointers(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&PointerIndex {
            offsets: self.offsets.clone(),
        })?)
    }

    /// Rebuild a store from its persisted parts
    pub fn from_parts(mut schema: Schema, buffer: Vec<u8>, pointers: &[u8]) -> Result<Self> {
        schema.reindex();
        let index: PointerIndex = bincode::deserialize(pointers)?;
        if index.offsets.iter().any(|&o| o as usize > buffer.len())
            || index.offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(QuarryError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "record pointers out of order",
            )));
        }
        Ok(Self {
            schema,
            buffer,
            offsets: index.offsets,
        })
    }
}

/// Decode a standalone record produced by [`RecordStore::record_bytes`]
pub fn decode_standalone(schema: &Schema, bytes: &[u8]) -> Result<Document> {
    let mut pos = 0;
    Ok(decode_record(schema, bytes, &mut pos)?)
}
