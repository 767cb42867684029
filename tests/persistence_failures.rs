//! Persistence failures: bounded retry and in-memory fallback
//!
//! Needs the `testing` feature for the fault-injection hook.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use quarry::query::term;
use quarry::{DocId, Index, IndexSettings, QuarryError, QueryRequest, RetryPolicy};

fn ids(index: &Index, request: impl Into<QueryRequest>) -> Vec<DocId> {
    index
        .search(request)
        .unwrap()
        .into_iter()
        .map(|r| r.doc_id)
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

#[test]
fn test_permanent_persistence_failure_keeps_segment_queryable() {
    init_tracing();
    let index = Index::new(IndexSettings::default().with_persist_retry(fast_retry(2))).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();
    index.inject_persist_failures(2);

    match index.commit(true) {
        Err(QuarryError::Persistence { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected a persistence failure, got {:?}", other),
    }

    let stats = index.stats();
    assert_eq!(stats.segment_count(), 2);
    assert_eq!(stats.immutable_count(), 0);
    assert_eq!(ids(&index, term("k", "x")), vec![0]);

    // the index keeps accepting writes and commits
    index.add_json(json!({"k": "x"})).unwrap();
    index.commit(true).unwrap();
    assert_eq!(ids(&index, term("k", "x")), vec![0, 1]);
    assert_eq!(index.stats().immutable_count(), 1);
}

#[test]
fn test_transient_persistence_failure_is_retried() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let settings = IndexSettings::persistent(tmp.path()).with_persist_retry(fast_retry(4));
    let index = Index::new(settings).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();
    index.inject_persist_failures(2);

    index.commit(true).unwrap();
    assert_eq!(index.stats().immutable_count(), 1);
    assert_eq!(ids(&index, term("k", "x")), vec![0]);
}
