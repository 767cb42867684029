//! Query expression tree
//!
//! A [`Query`] is built directly by callers (there is no query language).
//! `Boolean` generalizes AND/OR/NOT: a document matches when it matches
//! every `must` clause, at least one `should` clause (if there are any),
//! and no `must_not` clause.

use std::fmt;

use super::cache::CachedFilter;
use super::terms::{self, Term};
use crate::error::{QuarryError, Result};
use crate::models::Value;
use crate::schema::{ALL_FIELD, FIELDS_PRESENT};

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Query {
    All,
    None,
    Term { field: String, term: Term },
    Boolean(BooleanQuery),
    Cached(CachedFilter),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BooleanQuery {
    pub should: Vec<Query>,
    pub must: Vec<Query>,
    pub must_not: Vec<Query>,
}

impl BooleanQuery {
    pub fn is_empty(&self) -> bool {
        self.should.is_empty() && self.must.is_empty() && self.must_not.is_empty()
    }
}

impl Query {
    pub fn term(field: impl Into<String>, term: Term) -> Query {
        Query::Term {
            field: field.into(),
            term,
        }
    }

    pub fn boolean(should: Vec<Query>, must: Vec<Query>, must_not: Vec<Query>) -> Query {
        Query::Boolean(BooleanQuery {
            should,
            must,
            must_not,
        })
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        match self {
            Query::Boolean(b) => {
                1 + b
                    .should
                    .iter()
                    .chain(&b.must)
                    .chain(&b.must_not)
                    .map(Query::node_count)
                    .sum::<usize>()
            }
            _ => 1,
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::All => write!(f, "All"),
            Query::None => write!(f, "None"),
            Query::Term { field, term } => write!(f, "{}:{:?}", field, term),
            Query::Boolean(b) => f
                .debug_struct("Boolean")
                .field("should", &b.should)
                .field("must", &b.must)
                .field("must_not", &b.must_not)
                .finish(),
            Query::Cached(c) => write!(f, "Cached({})", c.name()),
        }
    }
}

// ── Builders ─────────────────────────────────────────────────────────────

/// Match every live document
pub fn all() -> Query {
    Query::All
}

/// Match nothing
pub fn none() -> Query {
    Query::None
}

/// Exact value match on a field.
///
/// Strings and booleans map to one term. Numbers match on the exact and the
/// coarsest precision term together. Arrays match any element.
pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Query {
    let field = field.into();
    match value.into() {
        number @ (Value::Int(_) | Value::Float(_)) => exact_number(field, terms::safe_number(&number)),
        Value::Array(items) => or(items.into_iter().map(|v| term(field.clone(), v)).collect()),
        other => {
            let mut found = terms::value_terms(&other);
            match found.pop() {
                Some(t) if found.is_empty() => Query::term(field, t),
                _ => Query::None,
            }
        }
    }
}

fn exact_number(field: String, value: Option<i64>) -> Query {
    let Some(v) = value else {
        return Query::None;
    };
    let levels = terms::number_terms(v);
    and(vec![
        Query::term(field.clone(), levels[0].clone()),
        Query::term(field, levels[terms::COARSEST_LEVEL as usize].clone()),
    ])
}

/// Documents where `field` holds a number in the given range.
/// Fails when both bounds are absent.
pub fn number_range(
    field: impl Into<String>,
    from: Option<i64>,
    to: Option<i64>,
    from_inclusive: bool,
    to_inclusive: bool,
) -> Result<Query> {
    if from.is_none() && to.is_none() {
        return Err(QuarryError::InvalidQuery(
            "number range needs at least one bound".to_string(),
        ));
    }
    let field = field.into();
    let Some((lo, hi)) = terms::shifted_bounds(from, to, from_inclusive, to_inclusive) else {
        return Ok(Query::None);
    };
    let clauses: Vec<Query> = terms::range_terms(lo, hi)
        .into_iter()
        .map(|t| Query::term(field.clone(), t))
        .collect();
    Ok(or(clauses))
}

pub fn and(clauses: Vec<Query>) -> Query {
    match clauses.len() {
        0 => Query::All,
        1 => clauses.into_iter().next().unwrap_or(Query::All),
        _ => Query::boolean(Vec::new(), clauses, Vec::new()),
    }
}

pub fn or(clauses: Vec<Query>) -> Query {
    match clauses.len() {
        0 => Query::None,
        1 => clauses.into_iter().next().unwrap_or(Query::None),
        _ => Query::boolean(clauses, Vec::new(), Vec::new()),
    }
}

pub fn not(clause: Query) -> Query {
    Query::boolean(Vec::new(), Vec::new(), vec![clause])
}

/// Documents with a non-empty value for `field`
pub fn exists(field: &str) -> Query {
    Query::term(FIELDS_PRESENT, terms::Term::string(field))
}

/// Documents where any field flagged for the catch-all field holds `value`
pub fn any_field(value: impl Into<Value>) -> Query {
    term(ALL_FIELD, value)
}
