//! Query requests
//!
//! Everything a caller can get wrong is checked by [`QueryRequest::validate`]
//! before any segment is touched.

use std::time::Duration;

use super::ast::Query;
use super::sort::SortClause;
use crate::error::{QuarryError, Result};
use crate::models::QueryMode;
use crate::schema::FieldRegistry;

#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub query: Query,
    pub sort: Vec<SortClause>,
    pub limit: Option<usize>,
    /// Stored fields to project into each result
    pub fields: Vec<String>,
    pub include_source: bool,
    pub mode: QueryMode,
    /// Overrides the index-wide query timeout
    pub timeout: Option<Duration>,
}

impl QueryRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            sort: Vec::new(),
            limit: None,
            fields: Vec::new(),
            include_source: false,
            mode: QueryMode::Current,
            timeout: None,
        }
    }

    pub fn sort_by(mut self, clause: SortClause) -> Self {
        self.sort.push(clause);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, include: bool) -> Self {
        self.include_source = include;
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self, registry: &FieldRegistry) -> Result<()> {
        if !self.sort.is_empty() && self.mode != QueryMode::Current {
            return Err(QuarryError::InvalidQuery(format!(
                "sorting is not supported in {:?} mode",
                self.mode
            )));
        }
        for clause in &self.sort {
            if !registry.config(&clause.field).is_sortable() {
                return Err(QuarryError::InvalidQuery(format!(
                    "cannot sort by '{}': field is neither stored nor sort-optimized",
                    clause.field
                )));
            }
        }
        if self.limit == Some(0) {
            return Err(QuarryError::InvalidQuery("limit must be positive".to_string()));
        }
        Ok(())
    }
}

impl From<Query> for QueryRequest {
    fn from(query: Query) -> Self {
        QueryRequest::new(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::all;
    use crate::schema::{FieldConfig, FieldFlags};

    #[test]
    fn test_sort_requires_current_mode() {
        let registry = FieldRegistry::default();
        let request = QueryRequest::new(all())
            .sort_by(SortClause::asc("id"))
            .with_mode(QueryMode::CurrentAndFuture);
        assert!(matches!(
            request.validate(&registry),
            Err(QuarryError::InvalidQuery(_))
        ));
        let request = QueryRequest::new(all()).sort_by(SortClause::asc("id"));
        assert!(request.validate(&registry).is_ok());
    }

    #[test]
    fn test_sort_field_must_be_retained() {
        let registry = FieldRegistry::default()
            .with_field("body", FieldConfig::new(FieldFlags::SEARCHABLE))
            .with_field("rank", FieldConfig::new(FieldFlags::SORT_OPTIMIZED));
        let bad = QueryRequest::new(all()).sort_by(SortClause::desc("body"));
        assert!(bad.validate(&registry).is_err());
        let good = QueryRequest::new(all()).sort_by(SortClause::desc("rank"));
        assert!(good.validate(&registry).is_ok());
    }

    #[test]
    fn test_builder() {
        let request = QueryRequest::new(all())
            .with_limit(5)
            .with_fields(["a", "b"])
            .with_source(true)
            .with_timeout(Duration::from_millis(10));
        assert_eq!(request.limit, Some(5));
        assert_eq!(request.fields, vec!["a".to_string(), "b".to_string()]);
        assert!(request.include_source);
        assert!(QueryRequest::new(all()).with_limit(0).validate(&FieldRegistry::default()).is_err());
    }
}
