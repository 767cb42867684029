//! Key namespaces of a persisted segment store
//!
//! Every key starts with a namespace byte. Postings come last and are keyed
//! by field name, a separator byte, then the term, so one field's terms sort
//! together.

use crate::query::Term;

pub const CONFIG: u8 = 0x01;
pub const SOURCE_BLOCK: u8 = 0x02;
pub const COLUMN: u8 = 0x03;
pub const GENERIC_POINTERS: u8 = 0x04;
pub const GENERIC_BUFFER: u8 = 0x05;
pub const DELETED: u8 = 0x06;
pub const TERM_DICT: u8 = 0x07;
pub const RANK: u8 = 0x08;
pub const POSTINGS: u8 = 0x10;

pub const FIELD_SEPARATOR: u8 = 0x00;

pub fn singleton(namespace: u8) -> Vec<u8> {
    vec![namespace]
}

/// Source documents are grouped in blocks; block numbers are big-endian so
/// keys sort in sequence order.
pub fn source_block(block: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(SOURCE_BLOCK);
    key.extend_from_slice(&block.to_be_bytes());
    key
}

pub fn column(field: &str) -> Vec<u8> {
    named(COLUMN, field)
}

pub fn rank(field: &str) -> Vec<u8> {
    named(RANK, field)
}

pub fn posting_key(field: &str, term: &Term) -> Vec<u8> {
    let mut key = Vec::with_capacity(field.len() + term.as_bytes().len() + 2);
    key.push(POSTINGS);
    key.extend_from_slice(field.as_bytes());
    key.push(FIELD_SEPARATOR);
    key.extend_from_slice(term.as_bytes());
    key
}

/// Prefix shared by all postings of `field`
pub fn posting_prefix(field: &str) -> Vec<u8> {
    let mut key = named(POSTINGS, field);
    key.push(FIELD_SEPARATOR);
    key
}

fn named(namespace: u8, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.push(namespace);
    key.extend_from_slice(name.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posting_keys_group_by_field() {
        let a = posting_key("a", &Term::string("zzz"));
        let ab = posting_key("ab", &Term::string("a"));
        let b = posting_key("b", &Term::string("a"));
        assert!(a < ab);
        assert!(ab < b);
        assert!(a.starts_with(&posting_prefix("a")));
        assert!(!ab.starts_with(&posting_prefix("a")));
    }

    #[test]
    fn test_source_blocks_sort_in_sequence() {
        assert!(source_block(2) < source_block(10));
        assert!(source_block(255) < source_block(256));
    }
}
