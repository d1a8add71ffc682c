//! Benchmarks for lens resolution, array projection, and live updates.
//!
//! Run with: cargo bench -p inspire-ui --bench resolve_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use inspire_core::Focus;
use inspire_store::{Kuery, MemoryStore};
use inspire_ui::{AttrSource, Engine, Lens, RenderPolicy, SpreadSpec, Valoscope};
use std::hint::black_box;
use std::rc::Rc;

fn engine_over(store: &MemoryStore) -> Engine {
    Engine::new(Rc::new(store.clone()), RenderPolicy::default()).expect("engine builds")
}

fn bench_sequence_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve/sequence_mount");

    for size in [16usize, 64, 256] {
        group.throughput(Throughput::Elements(size as u64));
        let store = MemoryStore::new();
        let engine = engine_over(&store);
        let items: Vec<Lens> = (0..size).map(|i| Lens::text(format!("item {i}"))).collect();
        group.bench_with_input(BenchmarkId::new("mount", size), &(), |b, _| {
            b.iter(|| {
                let view = engine.mount(Lens::sequence(items.clone()), Focus::None);
                let tree = view.tree();
                view.unmount();
                black_box(tree)
            });
        });
    }

    group.finish();
}

fn bench_clean_tree_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve/clean_tree_read");

    for size in [16usize, 64, 256] {
        group.throughput(Throughput::Elements(size as u64));
        let store = MemoryStore::new();
        let engine = engine_over(&store);
        let items: Vec<Lens> = (0..size).map(|i| Lens::text(format!("item {i}"))).collect();
        let view = engine.mount(Lens::sequence(items), Focus::None);
        group.bench_with_input(BenchmarkId::new("tree", size), &(), |b, _| {
            b.iter(|| black_box(view.tree()));
        });
    }

    group.finish();
}

fn bench_spread_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve/spread_mount");

    for size in [16usize, 64, 256] {
        group.throughput(Throughput::Elements(size as u64));
        let store = MemoryStore::new();
        let engine = engine_over(&store);
        let items = Focus::list(
            (0..size)
                .map(|i| Focus::from(i as i64))
                .collect::<Vec<_>>(),
        );
        group.bench_with_input(BenchmarkId::new("mount", size), &(), |b, _| {
            b.iter(|| {
                let spec = Valoscope::new().spread(SpreadSpec::new(AttrSource::value(items.clone())));
                let view = engine.mount(spec.into_lens(), Focus::None);
                let tree = view.tree();
                view.unmount();
                black_box(tree)
            });
        });
    }

    group.finish();
}

fn bench_live_update_flush(c: &mut Criterion) {
    let store = MemoryStore::new();
    let engine = engine_over(&store);
    let id = store.create_resource("doc");
    store.set_property(&id, "title", Focus::text("initial"));
    let spec = Valoscope::new().focus(AttrSource::live(Kuery::property("title")));
    let view = engine.mount(spec.into_lens(), Focus::resource("doc"));
    black_box(view.tree());

    let mut flip = false;
    c.bench_function("resolve/live_update_flush", |b| {
        b.iter(|| {
            flip = !flip;
            let value = if flip { "left" } else { "right" };
            store.set_property(&id, "title", Focus::text(value));
            black_box(engine.flush())
        });
    });
}

criterion_group!(
    benches,
    bench_sequence_mount,
    bench_clean_tree_read,
    bench_spread_mount,
    bench_live_update_flush
);
criterion_main!(benches);
