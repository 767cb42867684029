use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use quarry::query::{and, number_range, term};
use quarry::{
    AggregationSpec, Document, FieldConfig, FieldFlags, FieldRegistry, Index, IndexSettings, Query,
    QueryRequest, SortClause,
};

const COLORS: [&str; 4] = ["red", "green", "blue", "black"];

struct BenchEnv {
    _tmp: TempDir,
    index: Index,
}

fn make_doc(i: usize) -> Document {
    Document::new()
        .with("color", COLORS[i % COLORS.len()])
        .with("price", ((i * 37) % 1000) as i64)
        .with("title", format!("item number {}", i))
}

fn registry() -> FieldRegistry {
    FieldRegistry::default().with_field(
        "price",
        FieldConfig::new(FieldFlags::SEARCHABLE | FieldFlags::STORED | FieldFlags::SORT_OPTIMIZED),
    )
}

/// Index with most docs persisted across several segments and a tail in memory
fn build_env(doc_count: usize) -> BenchEnv {
    let tmp = TempDir::new().unwrap();
    let settings = IndexSettings::persistent(tmp.path()).with_max_segment_docs(doc_count / 4 + 1);
    let index = Index::open(settings, registry()).unwrap();
    index.add_all((0..doc_count).map(make_doc)).unwrap();
    index.commit(true).unwrap();
    index.add_all((doc_count..doc_count + 100).map(make_doc)).unwrap();
    BenchEnv { _tmp: tmp, index }
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    for &count in &[1_000usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let index = Index::open(IndexSettings::default(), registry()).unwrap();
                black_box(index.add_all((0..count).map(make_doc)).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let counts = [1_000usize, 10_000];
    let envs: Vec<(usize, BenchEnv)> = counts.iter().map(|&n| (n, build_env(n))).collect();

    let mut group = c.benchmark_group("term_and_range");
    for (count, env) in envs.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), env, |b, env| {
            let query = and(vec![
                term("color", "red"),
                number_range("price", Some(100), Some(600), true, false).unwrap(),
            ]);
            b.iter(|| black_box(env.index.search(query.clone()).unwrap().len()));
        });
    }
    group.finish();

    let mut group = c.benchmark_group("sorted_top_10");
    for (count, env) in envs.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), env, |b, env| {
            let request = QueryRequest::new(term("color", "blue"))
                .sort_by(SortClause::desc("price"))
                .with_limit(10)
                .with_fields(["price"]);
            b.iter(|| black_box(env.index.search(request.clone()).unwrap()));
        });
    }
    group.finish();

    let mut group = c.benchmark_group("group_by_count");
    for (count, env) in envs.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), env, |b, env| {
            let specs = [AggregationSpec::group_by("color", vec![AggregationSpec::count()])];
            b.iter(|| black_box(env.index.aggregate_query(Query::All, &specs).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ingest, bench_queries);
criterion_main!(benches);
