//! End-to-end query tests against an in-memory index
//!
//! Covers boolean and range queries, sorting, projection, deletion and
//! aggregation across mutable and persisted segments.

use serde_json::json;

use quarry::query::{and, exists, not, number_range, or, term};
use quarry::{
    AggregationResult, AggregationSpec, DocId, FieldConfig, FieldFlags, FieldRegistry, Index,
    IndexSettings, Query, QueryRequest, SortClause, Value, MAX_SAFE_INTEGER, MIN_SAFE_INTEGER,
};

fn create_index() -> Index {
    Index::new(IndexSettings::default()).unwrap()
}

fn ids(index: &Index, request: impl Into<QueryRequest>) -> Vec<DocId> {
    index
        .search(request)
        .unwrap()
        .into_iter()
        .map(|r| r.doc_id)
        .collect()
}

fn add_token_docs(index: &Index) {
    index
        .add_json(json!({"id": "12", "token_data": "abc", "number_data": 20}))
        .unwrap();
    index
        .add_json(json!({"id": "13", "token_data": "efg", "number_data": 30}))
        .unwrap();
}

#[test]
fn test_conjunction_of_disjoint_terms_is_empty() {
    let index = create_index();
    add_token_docs(&index);

    let query = and(vec![term("token_data", "abc"), term("token_data", "efg")]);
    assert!(ids(&index, query).is_empty());
}

#[test]
fn test_sorted_disjunction_with_limit() {
    let index = create_index();
    add_token_docs(&index);

    let request = QueryRequest::new(or(vec![term("token_data", "abc"), term("token_data", "efg")]))
        .sort_by(SortClause::asc("id"))
        .with_limit(2)
        .with_fields(["id"]);
    let results = index.search(request).unwrap();
    let values: Vec<&Value> = results.iter().filter_map(|r| r.field("id")).collect();
    assert_eq!(values, vec![&Value::from("12"), &Value::from("13")]);
}

#[test]
fn test_range_bounds_at_safe_integer_limits() {
    let index = create_index();
    index.add_json(json!({"number_data": 10000000})).unwrap();

    let upper = number_range("number_data", Some(30), Some(MAX_SAFE_INTEGER), true, true).unwrap();
    assert_eq!(ids(&index, upper), vec![0]);

    let lower = number_range("number_data", Some(MIN_SAFE_INTEGER), Some(30), true, false).unwrap();
    assert!(ids(&index, lower).is_empty());
}

#[test]
fn test_integers_beyond_safe_range_are_not_number_terms() {
    let index = create_index();
    index.add_json(json!({"n": MAX_SAFE_INTEGER})).unwrap();
    index.add_json(json!({"n": 1i64 << 60})).unwrap();

    assert_eq!(ids(&index, term("n", MAX_SAFE_INTEGER)), vec![0]);
    assert!(ids(&index, term("n", 1i64 << 60)).is_empty());
    let all_safe = number_range("n", Some(0), Some(MAX_SAFE_INTEGER), true, true).unwrap();
    assert_eq!(ids(&index, all_safe), vec![0]);

    index.commit(true).unwrap();
    assert_eq!(ids(&index, term("n", MAX_SAFE_INTEGER)), vec![0]);
}

#[test]
fn test_commit_keeps_results_identical() {
    let index = create_index();
    for i in 0..40 {
        index
            .add_json(json!({"n": i, "parity": if i % 2 == 0 { "even" } else { "odd" }}))
            .unwrap();
    }
    let queries = vec![
        QueryRequest::new(term("parity", "even")),
        QueryRequest::new(number_range("n", Some(5), Some(17), true, false).unwrap()),
        QueryRequest::new(and(vec![term("parity", "odd"), not(term("n", 7))])),
        QueryRequest::new(Query::All).sort_by(SortClause::desc("n")).with_limit(5),
    ];
    let before: Vec<Vec<DocId>> = queries.iter().map(|q| ids(&index, q.clone())).collect();

    index.commit(true).unwrap();
    let stats = index.stats();
    assert_eq!(stats.segment_count(), 2);
    assert_eq!(stats.immutable_count(), 1);

    let after: Vec<Vec<DocId>> = queries.iter().map(|q| ids(&index, q.clone())).collect();
    assert_eq!(before, after);
}

#[test]
fn test_deleted_docs_are_masked_everywhere() {
    let index = create_index();
    for _ in 0..4 {
        index.add_json(json!({"kind": "a"})).unwrap();
    }
    index.commit(true).unwrap();
    for _ in 0..4 {
        index.add_json(json!({"kind": "a"})).unwrap();
    }

    // one delete in the persisted segment, one in the mutable segment
    assert!(index.delete(1).unwrap());
    assert!(index.delete(6).unwrap());
    assert_eq!(ids(&index, term("kind", "a")), vec![0, 2, 3, 4, 5, 7]);

    // deletes survive the rotation of the mutable segment
    index.commit(true).unwrap();
    assert_eq!(ids(&index, term("kind", "a")), vec![0, 2, 3, 4, 5, 7]);
    assert_eq!(index.stats().live_docs(), 6);

    let counts = index
        .aggregate_query(term("kind", "a"), &[AggregationSpec::count()])
        .unwrap();
    assert_eq!(counts, vec![AggregationResult::Count(6)]);
}

#[test]
fn test_exists_and_any_field() {
    let index = create_index();
    index.add_json(json!({"title": "x", "tags": ["blue"]})).unwrap();
    index.add_json(json!({"title": "y", "tags": []})).unwrap();
    index.add_json(json!({"title": null})).unwrap();

    assert_eq!(ids(&index, exists("tags")), vec![0]);
    assert_eq!(ids(&index, exists("title")), vec![0, 1]);
    assert_eq!(ids(&index, quarry::query::any_field("blue")), vec![0]);
}

#[test]
fn test_aggregations_over_index() {
    let registry = FieldRegistry::default().with_field(
        "price",
        FieldConfig::new(FieldFlags::SEARCHABLE | FieldFlags::STORED | FieldFlags::SORT_OPTIMIZED),
    );
    let index = Index::open(IndexSettings::default(), registry).unwrap();
    index.add_json(json!({"shop": "north", "price": 12})).unwrap();
    index.add_json(json!({"shop": "south", "price": 7})).unwrap();
    index.commit(true).unwrap();
    index.add_json(json!({"shop": "north", "price": 3})).unwrap();

    let results = index
        .aggregate_query(
            Query::All,
            &[
                AggregationSpec::count(),
                AggregationSpec::last(vec![SortClause::asc("price")]),
                AggregationSpec::group_by(
                    "shop",
                    vec![AggregationSpec::first(vec![SortClause::asc("price")])],
                ),
            ],
        )
        .unwrap();

    assert_eq!(results[0].as_count(), Some(3));
    assert_eq!(results[1].as_top().map(|hit| hit.doc_id), Some(0));

    let groups = results[2].as_groups().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, Value::from("north"));
    assert_eq!(groups[0].results[0].as_top().map(|hit| hit.doc_id), Some(2));
    assert_eq!(groups[1].results[0].as_top().map(|hit| hit.doc_id), Some(1));
}

#[test]
fn test_invalid_requests_are_rejected_before_resolution() {
    let registry = FieldRegistry::default().with_field("body", FieldConfig::new(FieldFlags::SEARCHABLE));
    let index = Index::open(IndexSettings::default(), registry).unwrap();

    let unsortable = QueryRequest::new(Query::All).sort_by(SortClause::asc("body"));
    assert!(index.query(unsortable).is_err());

    let streaming_sort = QueryRequest::new(Query::All)
        .sort_by(SortClause::asc("n"))
        .with_mode(quarry::QueryMode::CurrentAndFuture);
    assert!(index.query(streaming_sort).is_err());

    assert!(number_range("n", None, None, true, true).is_err());
    assert!(index
        .aggregate_query(Query::All, &[AggregationSpec::group_by("body", vec![])])
        .is_err());
}

#[test]
fn test_known_fields_include_discovered() {
    let index = create_index();
    index.add_json(json!({"user": {"name": "ann"}, "age": 3})).unwrap();
    let fields = index.list_all_known_fields();
    assert!(fields.contains_key("user.name"));
    assert!(fields.contains_key("age"));
    assert!(fields.contains_key("_all"));
}
