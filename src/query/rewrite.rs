//! Boolean normalization
//!
//! After [`rewrite`]:
//! - nested booleans of the same kind are spliced into their parent
//! - duplicate clauses are removed (structural equality)
//! - a single `should` clause becomes a `must`
//! - a `must` clause holding only exclusions moves them to the parent
//! - a clause required and excluded at once makes the query match nothing
//! - an empty boolean matches everything

use std::collections::HashSet;

use super::ast::{BooleanQuery, Query};

pub fn rewrite(query: Query) -> Query {
    match query {
        Query::Boolean(b) => rewrite_boolean(b),
        other => other,
    }
}

fn rewrite_boolean(b: BooleanQuery) -> Query {
    let had_should = !b.should.is_empty();
    let mut should = Vec::new();
    let mut should_satisfied = false;
    for clause in b.should.into_iter().map(rewrite) {
        match clause {
            Query::All => should_satisfied = true,
            Query::None => {}
            Query::Boolean(inner) if inner.must.is_empty() && inner.must_not.is_empty() => {
                should.extend(inner.should)
            }
            other => should.push(other),
        }
    }
    if should_satisfied {
        should.clear();
    } else if had_should && should.is_empty() {
        return Query::None;
    }

    let mut pending_must: Vec<Query> = b.must.into_iter().map(rewrite).collect();
    dedupe(&mut should);
    if should.len() == 1 {
        pending_must.extend(should.drain(..));
    }

    let mut must = Vec::new();
    let mut must_not = Vec::new();
    for clause in pending_must {
        match clause {
            Query::All => {}
            Query::None => return Query::None,
            Query::Boolean(inner) if inner.should.is_empty() => {
                must.extend(inner.must);
                must_not.extend(inner.must_not);
            }
            other => must.push(other),
        }
    }

    let mut excluded = Vec::new();
    for clause in b.must_not.into_iter().map(rewrite).chain(must_not) {
        match clause {
            Query::All => return Query::None,
            Query::None => {}
            Query::Boolean(inner) if inner.must.is_empty() && inner.must_not.is_empty() => {
                excluded.extend(inner.should)
            }
            other => excluded.push(other),
        }
    }

    dedupe(&mut must);
    dedupe(&mut excluded);

    let required: HashSet<&Query> = must.iter().collect();
    if excluded.iter().any(|q| required.contains(q)) {
        return Query::None;
    }

    if should.is_empty() && excluded.is_empty() {
        match must.len() {
            0 => return Query::All,
            1 => return must.pop().unwrap_or(Query::All),
            _ => {}
        }
    }
    Query::boolean(should, must, excluded)
}

fn dedupe(clauses: &mut Vec<Query>) {
    let mut seen = HashSet::with_capacity(clauses.len());
    clauses.retain(|q| seen.insert(q.clone()));
}
