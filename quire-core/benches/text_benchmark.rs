use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use quire_core::{CharId, Operation, ReplicaId, RichText};
use std::hint::black_box;

fn typed_ops(replica: ReplicaId, text: &str) -> Vec<Operation> {
    let mut doc = RichText::new(replica);
    doc.insert_str(CharId::BASE, text, &[]).unwrap()
}

fn bench_local_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("RichText");
    group.throughput(Throughput::Elements(1));

    group.bench_function("local_insert_append", |b| {
        // Appending to an ever-growing document, like sustained typing.
        let mut doc = RichText::new(ReplicaId::from_u128(1));
        let mut cursor = CharId::BASE;
        b.iter(|| {
            let op = doc.insert(black_box(cursor), 'x', &[]).unwrap();
            cursor = op.target();
            black_box(op);
        })
    });

    group.finish();
}

fn bench_remote_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("RichText");
    let ops = typed_ops(ReplicaId::from_u128(1), &"lorem ipsum ".repeat(100));
    group.throughput(Throughput::Elements(ops.len() as u64));

    group.bench_function("apply_remote_1200_in_order", |b| {
        b.iter(|| {
            let mut doc = RichText::new(ReplicaId::from_u128(2));
            for op in &ops {
                doc.apply_remote(black_box(op.clone())).unwrap();
            }
            black_box(doc.len());
        })
    });

    group.bench_function("apply_remote_1200_reversed", |b| {
        b.iter(|| {
            let mut doc = RichText::new(ReplicaId::from_u128(2));
            for op in ops.iter().rev() {
                doc.apply_remote(black_box(op.clone())).unwrap();
            }
            black_box(doc.len());
        })
    });

    group.finish();
}

fn bench_relative_walk(c: &mut Criterion) {
    let mut doc = RichText::new(ReplicaId::from_u128(1));
    doc.insert_str(CharId::BASE, &"a".repeat(5000), &[]).unwrap();

    c.bench_function("get_char_relative_to_5k", |b| {
        b.iter(|| {
            black_box(
                doc.get_char_relative_to(black_box(CharId::BASE), 2500, quire_core::Boundary::Clamp)
                    .unwrap(),
            );
        })
    });
}

criterion_group!(benches, bench_local_typing, bench_remote_merge, bench_relative_walk);
criterion_main!(benches);
