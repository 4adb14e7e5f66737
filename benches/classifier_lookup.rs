//! End-to-end classifier lookup benchmarks: batch throughput across a
//! multi-subtable ruleset, and the cost of `optimize()`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dpcls::miniflow::Miniflow;
use dpcls::{Classifier, ClassifierConfig, FlowKey};

fn key(blocks: &[(usize, u64)]) -> FlowKey {
    FlowKey::new(Miniflow::from_blocks(blocks.iter().copied()))
}

fn build_classifier(subtables: usize, rules_per_subtable: usize) -> Classifier {
    let classifier = Classifier::new(ClassifierConfig::default());
    for s in 0..subtables {
        // Each subtable wildcards a distinct block, so lookups must walk
        // the MRU chain rather than all hitting the first subtable.
        let mask = key(&[(s, u64::MAX)]);
        for r in 0..rules_per_subtable as u64 {
            classifier.insert(mask.clone(), key(&[(s, r)])).unwrap();
        }
    }
    classifier
}

fn bench_batch_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("classifier_lookup_batch");
    let classifier = build_classifier(8, 128);

    for &batch in &[1usize, 16, 64] {
        let packets: Vec<FlowKey> = (0..batch as u64).map(|i| key(&[(0, i % 128)])).collect();
        let keys: Vec<&FlowKey> = packets.iter().collect();

        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, _| {
            b.iter(|| {
                let mut out = vec![None; batch];
                black_box(classifier.lookup(&keys, &mut out))
            })
        });
    }
    group.finish();
}

fn bench_worst_case_miss(c: &mut Criterion) {
    let classifier = build_classifier(8, 128);
    let miss = key(&[(99, 0)]);
    let keys = [&miss];

    c.bench_function("classifier_lookup_miss_walks_all_subtables", |b| {
        b.iter(|| {
            let mut out = vec![None];
            black_box(classifier.lookup(&keys, &mut out))
        })
    });
}

fn bench_optimize(c: &mut Criterion) {
    use dpcls::Capabilities;

    c.bench_function("classifier_optimize_8_subtables", |b| {
        let classifier = build_classifier(8, 128);
        b.iter(|| classifier.optimize(black_box(Capabilities::ALL)))
    });
}

criterion_group!(benches, bench_batch_lookup, bench_worst_case_miss, bench_optimize);
criterion_main!(benches);
