use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use strata_core::{DependencySorter, ItemDef, SetupItem, SortOptions};

struct Tier {
    name: &'static str,
    items: usize,
}

const TIERS: [Tier; 3] = [
    Tier { name: "small", items: 100 },
    Tier { name: "medium", items: 2_000 },
    Tier { name: "large", items: 20_000 },
];

/// Containers of 20 members each; every member requires up to two items
/// of the previous container.
fn corpus(items: usize) -> Vec<Arc<dyn SetupItem>> {
    let per_container = 20;
    let mut out: Vec<Arc<dyn SetupItem>> = Vec::with_capacity(items);
    for i in 0..items {
        let container = i / per_container;
        if i % per_container == 0 {
            out.push(ItemDef::container(format!("C{container:05}")).shared());
            continue;
        }
        let mut item = ItemDef::new(format!("M{i:06}")).in_container(format!("C{container:05}"));
        if container > 0 {
            let previous = (container - 1) * per_container;
            item = item
                .depends_on(format!("M{:06}", previous + 1 + i % (per_container - 1)))
                .depends_on(format!("?M{:06}", previous + 1));
        }
        out.push(item.shared());
    }
    out
}

fn chain(items: usize) -> Vec<Arc<dyn SetupItem>> {
    (0..items)
        .map(|i| {
            let item = ItemDef::new(format!("N{i:06}"));
            let item = if i + 1 < items {
                item.depends_on(format!("N{:06}", i + 1))
            } else {
                item
            };
            item.shared() as Arc<dyn SetupItem>
        })
        .collect()
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort.tiered");

    for tier in &TIERS {
        group.throughput(Throughput::Elements(tier.items as u64));

        group.bench_with_input(BenchmarkId::new("containers", tier.name), &tier.items, |b, &n| {
            b.iter_batched(
                || corpus(n),
                |items| black_box(DependencySorter::new(SortOptions::default()).sort(items, &[])),
                criterion::BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("chain", tier.name), &tier.items, |b, &n| {
            b.iter_batched(
                || chain(n),
                |items| black_box(DependencySorter::new(SortOptions::default()).sort(items, &[])),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sort);
criterion_main!(benches);
