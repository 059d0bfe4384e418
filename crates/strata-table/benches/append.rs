use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use serde::{Deserialize, Serialize};
use strata_table::{Row, Table};
use strata_types::Id;

#[derive(Clone, Serialize, Deserialize)]
struct Entry {
    id: Id,
    body: String,
}

impl Row for Entry {
    fn id(&self) -> Id {
        self.id
    }
}

fn bench_append(c: &mut Criterion) {
    c.bench_function("append 100 rows", |b| {
        b.iter_batched(
            || tempfile::tempdir().unwrap(),
            |dir| {
                let table: Table<Entry> = Table::open(dir.path().join("t.jsonl")).unwrap();
                for i in 0..100 {
                    table
                        .append(Entry {
                            id: Id::new(),
                            body: format!("row {i}"),
                        })
                        .unwrap();
                }
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_modify(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let table: Table<Entry> = Table::open(dir.path().join("t.jsonl")).unwrap();
    let ids: Vec<Id> = (0..1_000)
        .map(|i| {
            table
                .append(Entry {
                    id: Id::new(),
                    body: format!("row {i}"),
                })
                .unwrap()
                .id
        })
        .collect();
    let target = ids[ids.len() / 2];
    c.bench_function("modify in 1000-row table", |b| {
        b.iter(|| {
            table
                .modify(target, |e| {
                    e.body.push('x');
                    Ok::<(), strata_table::TableError>(())
                })
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_append, bench_modify);
criterion_main!(benches);
