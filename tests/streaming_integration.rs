//! Live query streams: future modes, rotation, cancellation and timeouts

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use quarry::query::term;
use quarry::{DocId, Index, IndexSettings, QuarryError, Query, QueryMode, QueryRequest};

fn collect_ids(stream: quarry::QueryStream) -> Vec<DocId> {
    stream.map(|r| r.unwrap().doc_id).collect()
}

#[test]
fn test_current_and_future_sees_each_doc_once_across_rotation() {
    let index = Index::new(IndexSettings::default().with_max_segment_docs(3)).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();

    let stream = index
        .query(
            QueryRequest::new(term("k", "x"))
                .with_mode(QueryMode::CurrentAndFuture)
                .with_limit(8),
        )
        .unwrap();

    // crosses the automatic rotation at three docs
    let batch = (0..4).map(|_| quarry::Document::new().with("k", "x"));
    assert_eq!(index.add_all(batch).unwrap(), 4);
    index.commit(true).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();
    index.add_json(json!({"k": "y"})).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();

    assert_eq!(collect_ids(stream), vec![0, 1, 2, 3, 4, 5, 6, 8]);
}

#[test]
fn test_concurrent_writer_is_observed_exactly_once() {
    let index = Arc::new(
        Index::new(
            IndexSettings::default()
                .with_batch_size(7)
                .with_max_segment_docs(50),
        )
        .unwrap(),
    );
    for _ in 0..100 {
        index.add_json(json!({"k": "x"})).unwrap();
    }
    let total = 400;

    let stream = index
        .query(
            QueryRequest::new(Query::All)
                .with_mode(QueryMode::CurrentAndFuture)
                .with_limit(total),
        )
        .unwrap();

    let writer = {
        let index = index.clone();
        thread::spawn(move || {
            for chunk in 0..30 {
                let docs = (0..10).map(|_| quarry::Document::new().with("k", "x"));
                index.add_all(docs).unwrap();
                if chunk % 7 == 0 {
                    index.commit(false).unwrap();
                }
            }
        })
    };

    let seen = collect_ids(stream);
    writer.join().unwrap();

    let unique: BTreeSet<DocId> = seen.iter().copied().collect();
    assert_eq!(seen.len(), total);
    assert_eq!(unique.len(), total);
    assert_eq!(unique.iter().next_back().copied(), Some(total as DocId - 1));
}

#[test]
fn test_future_mode_skips_existing_docs() {
    let index = Index::new(IndexSettings::default()).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();
    let stream = index
        .query(
            QueryRequest::new(term("k", "x"))
                .with_mode(QueryMode::Future)
                .with_limit(2),
        )
        .unwrap();
    index.add_json(json!({"k": "y"})).unwrap();
    index.commit(false).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();
    index.add_json(json!({"k": "x"})).unwrap();

    assert_eq!(collect_ids(stream), vec![2, 3]);
}

#[test]
fn test_stream_timeout_ends_with_one_error() {
    let index = Index::new(IndexSettings::default()).unwrap();
    let mut stream = index
        .query(
            QueryRequest::new(Query::All)
                .with_mode(QueryMode::Future)
                .with_timeout(Duration::from_millis(30)),
        )
        .unwrap();

    let started = Instant::now();
    match stream.next() {
        Some(Err(QuarryError::Timeout(timeout))) => assert_eq!(timeout, Duration::from_millis(30)),
        other => panic!("expected a timeout, got {:?}", other.map(|r| r.map(|i| i.doc_id))),
    }
    assert!(started.elapsed() >= Duration::from_millis(25));
    assert!(stream.next().is_none());
}

#[test]
fn test_index_timeout_applies_to_queries_without_their_own() {
    let index = Index::new(IndexSettings::default().with_query_timeout(Duration::from_millis(10))).unwrap();
    let results: Vec<_> = index
        .query(QueryRequest::new(Query::All).with_mode(QueryMode::Future))
        .unwrap()
        .collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(QuarryError::Timeout(_))));
}

#[test]
fn test_limit_stops_a_current_query_early() {
    let index = Index::new(IndexSettings::default()).unwrap();
    for _ in 0..20 {
        index.add_json(json!({"k": "x"})).unwrap();
    }
    let mut stream = index.query(QueryRequest::new(term("k", "x")).with_limit(3)).unwrap();
    assert_eq!(stream.by_ref().count(), 3);
    assert!(stream.next().is_none());
}
