use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::models::{DocId, Document, Value};
use crate::query::SortClause;
use crate::schema::FieldRegistry;
use crate::segment::SegmentId;

/// One aggregation over the documents matching a query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AggregationSpec {
    /// Number of matching documents
    Count,
    /// The first document under the sort
    First(Vec<SortClause>),
    /// The first document under the inverted sort
    Last(Vec<SortClause>),
    /// Partition by the value of `field` and run nested aggregations per group
    GroupBy {
        field: String,
        aggregations: Vec<AggregationSpec>,
    },
}

impl AggregationSpec {
    pub fn count() -> Self {
        AggregationSpec::Count
    }

    pub fn first(sort: Vec<SortClause>) -> Self {
        AggregationSpec::First(sort)
    }

    pub fn last(sort: Vec<SortClause>) -> Self {
        AggregationSpec::Last(sort)
    }

    pub fn group_by(field: impl Into<String>, aggregations: Vec<AggregationSpec>) -> Self {
        AggregationSpec::GroupBy {
            field: field.into(),
            aggregations,
        }
    }

    /// Reject fields whose values are not retained
    pub fn validate(&self, registry: &FieldRegistry) -> Result<()> {
        match self {
            AggregationSpec::Count => Ok(()),
            AggregationSpec::First(sort) | AggregationSpec::Last(sort) => {
                if sort.is_empty() {
                    return Err(QuarryError::InvalidQuery(
                        "first/last aggregation needs a sort clause".to_string(),
                    ));
                }
                for clause in sort {
                    if !registry.config(&clause.field).is_sortable() {
                        return Err(QuarryError::InvalidQuery(format!(
                            "cannot sort by '{}': field is neither stored nor sort-optimized",
                            clause.field
                        )));
                    }
                }
                Ok(())
            }
            AggregationSpec::GroupBy {
                field,
                aggregations,
            } => {
                if !registry.config(field).flags.is_retained() {
                    return Err(QuarryError::InvalidQuery(format!(
                        "cannot group by '{}': field values are not retained",
                        field
                    )));
                }
                aggregations.iter().try_for_each(|a| a.validate(registry))
            }
        }
    }
}

/// The winning document of a first/last aggregation
#[derive(Clone, Debug, PartialEq)]
pub struct TopHit {
    pub doc_id: DocId,
    pub segment: SegmentId,
    /// Values of the sort fields
    pub fields: Document,
    pub source: Option<Document>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupResult {
    pub key: Value,
    /// One result per nested aggregation, in order
    pub results: Vec<AggregationResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AggregationResult {
    Count(u64),
    Top(Option<TopHit>),
    /// Groups in ascending key order
    Groups(Vec<GroupResult>),
}

impl AggregationResult {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            AggregationResult::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_top(&self) -> Option<&TopHit> {
        match self {
            AggregationResult::Top(hit) => hit.as_ref(),
            _ => None,
        }
    }

    pub fn as_groups(&self) -> Option<&[GroupResult]> {
        match self {
            AggregationResult::Groups(groups) => Some(groups),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldConfig, FieldFlags};

    #[test]
    fn test_validate() {
        let registry = FieldRegistry::default()
            .with_field("body", FieldConfig::new(FieldFlags::SEARCHABLE));
        assert!(AggregationSpec::count().validate(&registry).is_ok());
        assert!(AggregationSpec::group_by("body", vec![]).validate(&registry).is_err());
        assert!(AggregationSpec::first(vec![]).validate(&registry).is_err());
        let nested = AggregationSpec::group_by(
            "color",
            vec![AggregationSpec::last(vec![SortClause::asc("body")])],
        );
        assert!(nested.validate(&registry).is_err());
        let nested = AggregationSpec::group_by(
            "color",
            vec![AggregationSpec::last(vec![SortClause::asc("price")])],
        );
        assert!(nested.validate(&registry).is_ok());
    }
}
