use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgcrud::{ColumnCase, Record, Where, placeholder, statement};
use serde_json::{Value, json};

/// A payload with `n` columns: col0, col1, ...
fn payload(n: usize) -> Record {
    (0..n).map(|i| (format!("col{i}"), json!(i))).collect()
}

/// `a0 = $1 AND a1 = $2 ...` with `n` placeholders.
fn fragment(n: usize) -> String {
    (0..n)
        .map(|i| format!("a{i} = ${}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn bench_renumber(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholder/renumber");

    for n in [1, 5, 20, 100] {
        let sql = fragment(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &sql, |b, sql| {
            b.iter(|| black_box(placeholder::renumber(sql, 10)));
        });
    }

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement/insert");

    for n in [1, 5, 20, 100] {
        let record = payload(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &record, |b, record| {
            b.iter(|| black_box(statement::insert("t", record, ColumnCase::Preserve)));
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement/update");

    for n in [1, 5, 20] {
        let record = payload(n);
        let params: Vec<Value> = (0..n).map(|i| json!(i)).collect();
        let cond = Where::new(fragment(n), params);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(statement::update("t", &record, &cond, ColumnCase::Preserve)));
        });
    }

    group.finish();
}

fn bench_structured_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement/select_structured");

    for n in [1, 5, 20] {
        let cond = (0..n).fold(Where::none(), |acc, i| {
            acc.and(Where::eq(format!("col{i}"), i as i64))
        });
        group.bench_with_input(BenchmarkId::from_parameter(n), &cond, |b, cond| {
            b.iter(|| black_box(statement::select("t", "*", cond, None, ColumnCase::Camel)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_renumber,
    bench_insert,
    bench_update,
    bench_structured_condition
);
criterion_main!(benches);
