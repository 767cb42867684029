//! Term encoding
//!
//! Terms are ordered byte strings. The first byte tags the value kind:
//! `s` strings, `b` booleans, `n` numbers.
//!
//! Numbers are shifted into an unsigned 54-bit domain and written as base-64
//! digits over an alphabet whose symbols ascend in byte order, so term order
//! matches numeric order. Each number is indexed at nine precision levels:
//! level `l` keeps the top `9 - l` digits (`u >> 6l`). Level 0 is the exact
//! value, level 8 a single coarse digit. Ranges decompose into a handful of
//! terms across levels instead of one term per value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Value, MAX_SAFE_INTEGER, MIN_SAFE_INTEGER};

const ALPHABET: &[u8; 64] = b"-.0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub const STRING_PREFIX: u8 = b's';
pub const BOOL_PREFIX: u8 = b'b';
pub const NUMBER_PREFIX: u8 = b'n';

/// Number of precision levels per number
pub const LEVELS: u32 = 9;
pub const COARSEST_LEVEL: u32 = LEVELS - 1;
const DIGIT_BITS: u32 = 6;
const OFFSET: u64 = 1 << 53;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term(Vec<u8>);

impl Term {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Term(bytes.into())
    }

    pub fn string(s: &str) -> Self {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.push(STRING_PREFIX);
        bytes.extend_from_slice(s.as_bytes());
        Term(bytes)
    }

    pub fn boolean(b: bool) -> Self {
        Term(vec![BOOL_PREFIX, if b { b'1' } else { b'0' }])
    }

    /// Term for a shifted number at one precision level
    pub fn number_at(shifted: u64, level: u32) -> Self {
        let digits = (LEVELS - level) as usize;
        let value = shifted >> (DIGIT_BITS * level);
        let mut bytes = vec![0u8; digits + 2];
        bytes[0] = NUMBER_PREFIX;
        bytes[1] = b'0' + level as u8;
        let mut v = value;
        for slot in bytes[2..].iter_mut().rev() {
            *slot = ALPHABET[(v & 63) as usize];
            v >>= DIGIT_BITS;
        }
        Term(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Decode a level-0 number term back into its integer value
    pub fn as_number(&self) -> Option<i64> {
        let bytes = self.0.as_slice();
        if bytes.len() != LEVELS as usize + 2 || bytes[0] != NUMBER_PREFIX || bytes[1] != b'0' {
            return None;
        }
        let mut shifted = 0u64;
        for &b in &bytes[2..] {
            let digit = ALPHABET.iter().position(|&a| a == b)? as u64;
            shifted = (shifted << DIGIT_BITS) | digit;
        }
        Some(shifted as i64 - OFFSET as i64)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term({})", String::from_utf8_lossy(&self.0))
    }
}

/// Shift a safe integer into the unsigned domain, clamping out-of-range values
pub fn shift(value: i64) -> u64 {
    (value.clamp(MIN_SAFE_INTEGER, MAX_SAFE_INTEGER) + OFFSET as i64) as u64
}

/// The integer a value is indexed as, if it is a number in the safe range
pub fn safe_number(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .filter(|i| (MIN_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(i))
}

/// All precision-level terms for one number, finest first
pub fn number_terms(value: i64) -> Vec<Term> {
    let shifted = shift(value);
    (0..LEVELS).map(|level| Term::number_at(shifted, level)).collect()
}

/// Terms a value is indexed under without an analyzer.
/// Arrays contribute the terms of each element; non-integral floats,
/// integers beyond the safe range and nested objects produce no terms.
pub fn value_terms(value: &Value) -> Vec<Term> {
    let mut out = Vec::new();
    push_value_terms(value, &mut out);
    out
}

fn push_value_terms(value: &Value, out: &mut Vec<Term>) {
    match value {
        Value::String(s) => out.push(Term::string(s)),
        Value::Bool(b) => out.push(Term::boolean(*b)),
        Value::Int(_) | Value::Float(_) => {
            if let Some(i) = safe_number(value) {
                out.extend(number_terms(i));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| push_value_terms(v, out)),
        Value::Null | Value::Bytes(_) | Value::Object(_) => {}
    }
}

/// Decompose the shifted half-open range `[lo, hi)` into terms whose
/// postings union to exactly the values in range.
pub fn range_terms(lo: u64, hi: u64) -> Vec<Term> {
    let mut out = Vec::new();
    if lo >= hi {
        return out;
    }
    let (mut lo, mut hi) = (lo, hi);
    for level in 0..COARSEST_LEVEL {
        let shift = DIGIT_BITS * level;
        let lo_l = lo >> shift;
        let hi_l = hi >> shift;
        let lo_up = (lo_l + 63) & !63;
        let hi_down = hi_l & !63;
        if lo_up >= hi_down {
            push_level(&mut out, level, lo_l, hi_l);
            return out;
        }
        push_level(&mut out, level, lo_l, lo_up);
        push_level(&mut out, level, hi_down, hi_l);
        lo = lo_up << shift;
        hi = hi_down << shift;
    }
    let shift = DIGIT_BITS * COARSEST_LEVEL;
    push_level(&mut out, COARSEST_LEVEL, lo >> shift, hi >> shift);
    out
}

fn push_level(out: &mut Vec<Term>, level: u32, from: u64, to: u64) {
    let shift = DIGIT_BITS * level;
    for bucket in from..to {
        out.push(Term::number_at(bucket << shift, level));
    }
}

/// Shifted half-open bounds for an integer range; `None` when the range is empty
pub fn shifted_bounds(
    from: Option<i64>,
    to: Option<i64>,
    from_inclusive: bool,
    to_inclusive: bool,
) -> Option<(u64, u64)> {
    let lo = match from {
        Some(v) if v > MAX_SAFE_INTEGER => return None,
        Some(v) if from_inclusive || v < MIN_SAFE_INTEGER => shift(v),
        Some(v) if v >= MAX_SAFE_INTEGER => return None,
        Some(v) => shift(v) + 1,
        None => shift(MIN_SAFE_INTEGER),
    };
    let hi = match to {
        Some(v) if v < MIN_SAFE_INTEGER => return None,
        Some(v) if to_inclusive || v > MAX_SAFE_INTEGER => shift(v) + 1,
        Some(v) => shift(v),
        None => shift(MAX_SAFE_INTEGER) + 1,
    };
    (lo < hi).then_some((lo, hi))
}
