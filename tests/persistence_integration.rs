//! On-disk indexes: commit and reopen

use serde_json::json;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use quarry::persistence::{IndexManifest, MANIFEST_FILE};
use quarry::query::{number_range, term};
use quarry::{DocId, Index, IndexSettings, Query, QueryRequest, SortClause, Value};

fn ids(index: &Index, request: impl Into<QueryRequest>) -> Vec<DocId> {
    index
        .search(request)
        .unwrap()
        .into_iter()
        .map(|r| r.doc_id)
        .collect()
}

/// Route index logs to the test output; set RUST_LOG to see them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_reopen_restores_committed_segments() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    {
        let index = Index::new(IndexSettings::persistent(tmp.path())).unwrap();
        for i in 0..5 {
            index
                .add_json(json!({"n": i, "name": format!("doc-{}", i)}))
                .unwrap();
        }
        index.commit(true).unwrap();
        assert!(index.delete(2).unwrap());
        // never committed, so gone after reopen
        index.add_json(json!({"n": 99})).unwrap();
    }

    assert!(tmp.path().join(MANIFEST_FILE).exists());
    let manifest = IndexManifest::load(tmp.path()).unwrap().unwrap();
    assert_eq!(manifest.segments.len(), 1);
    assert_eq!(manifest.next_doc_id(), 5);

    let index = Index::new(IndexSettings::persistent(tmp.path())).unwrap();
    let stats = index.stats();
    assert_eq!(stats.total_docs(), 5);
    assert_eq!(stats.deleted_docs(), 1);
    assert_eq!(ids(&index, Query::All), vec![0, 1, 3, 4]);
    assert!(ids(&index, term("n", 99)).is_empty());
    assert!(index.list_all_known_fields().contains_key("name"));

    let results = index
        .search(
            QueryRequest::new(number_range("n", Some(3), None, true, true).unwrap())
                .with_fields(["name"])
                .with_source(true),
        )
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].field("name"), Some(&Value::from("doc-3")));
    assert!(results[1].source.is_some());

    // new ids continue after the persisted ones
    index.add_json(json!({"n": 7})).unwrap();
    assert_eq!(ids(&index, term("n", 7)), vec![5]);
}

#[test]
fn test_multiple_commits_reopen_in_order() {
    let tmp = TempDir::new().unwrap();
    {
        let index = Index::new(IndexSettings::persistent(tmp.path()).with_max_segment_docs(4)).unwrap();
        let docs = (0..10).map(|i| quarry::Document::new().with("n", i as i64));
        index.add_all(docs).unwrap();
        index.commit(true).unwrap();
        assert_eq!(index.stats().immutable_count(), 3);
    }

    let index = Index::new(IndexSettings::persistent(tmp.path())).unwrap();
    assert_eq!(index.stats().immutable_count(), 3);
    let sorted = QueryRequest::new(Query::All)
        .sort_by(SortClause::desc("n"))
        .with_limit(3);
    assert_eq!(ids(&index, sorted), vec![9, 8, 7]);
}
