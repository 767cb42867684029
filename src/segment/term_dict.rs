//! Term dictionary for persisted segments
//!
//! An FST map from posting key (`field`, separator, term bytes) to the
//! posting's document frequency. Held in memory so existence probes and
//! term enumeration never touch the store.

use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use std::io;

use super::keys::{posting_key, FIELD_SEPARATOR};
use crate::query::Term;

pub struct TermDictionary {
    fst: Map<Vec<u8>>,
}

impl TermDictionary {
    pub fn new(fst_data: Vec<u8>) -> io::Result<Self> {
        let fst = Map::new(fst_data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { fst })
    }

    pub fn contains(&self, field: &str, term: &Term) -> bool {
        self.fst.contains_key(term_key(field, term))
    }

    pub fn doc_freq(&self, field: &str, term: &Term) -> Option<u64> {
        self.fst.get(term_key(field, term))
    }

    /// Terms of one field in ascending order
    pub fn terms(&self, field: &str) -> Vec<Term> {
        let mut lower = field.as_bytes().to_vec();
        lower.push(FIELD_SEPARATOR);
        let mut upper = field.as_bytes().to_vec();
        upper.push(FIELD_SEPARATOR + 1);

        let mut stream = self.fst.range().ge(&lower).lt(&upper).into_stream();
        let mut out = Vec::new();
        while let Some((key, _)) = stream.next() {
            out.push(Term::from_bytes(&key[lower.len()..]));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.fst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fst.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.fst.as_fst().as_bytes()
    }
}

fn term_key(field: &str, term: &Term) -> Vec<u8> {
    // Dictionary keys are posting keys without the namespace byte
    posting_key(field, term)[1..].to_vec()
}

/// Collects `(field, term, doc_freq)` entries in any order
#[derive(Default)]
pub struct TermDictionaryBuilder {
    entries: Vec<(Vec<u8>, u64)>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, term: &Term, doc_freq: u64) {
        self.entries.push((term_key(field, term), doc_freq));
    }

    pub fn build(mut self) -> io::Result<TermDictionary> {
        // FST requires sorted input
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.entries.dedup_by(|a, b| a.0 == b.0);

        let mut builder = MapBuilder::memory();
        for (key, freq) in &self.entries {
            builder
                .insert(key, *freq)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        let data = builder
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        TermDictionary::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_enumerate() {
        let mut builder = TermDictionaryBuilder::new();
        builder.add("tag", &Term::string("b"), 2);
        builder.add("tag", &Term::string("a"), 5);
        builder.add("tags", &Term::string("z"), 1);
        builder.add("name", &Term::string("ann"), 1);
        let dict = builder.build().unwrap();

        assert!(dict.contains("tag", &Term::string("a")));
        assert!(!dict.contains("tag", &Term::string("z")));
        assert_eq!(dict.doc_freq("tag", &Term::string("a")), Some(5));
        assert_eq!(
            dict.terms("tag"),
            vec![Term::string("a"), Term::string("b")]
        );
        assert!(dict.terms("missing").is_empty());

        let reopened = TermDictionary::new(dict.as_bytes().to_vec()).unwrap();
        assert_eq!(reopened.len(), 4);
    }
}
