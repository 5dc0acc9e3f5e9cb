//! Benchmarks for the spatial index and particle pool
//!
//! Measures performance of:
//! - Quadtree construction
//! - Viewport queries at different zoom levels
//! - Particle update and vertex packing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowscope_core::{Node, NodeId, ParticleConfig, ParticleSystem, Rect, SpatialIndex};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_nodes(count: usize) -> Vec<Node> {
    let mut rng = StdRng::seed_from_u64(0xf10e);
    (0..count)
        .map(|i| {
            Node::new(
                NodeId(i as u64),
                Vec2::new(rng.gen_range(0.0..10_000.0), rng.gen_range(0.0..10_000.0)),
            )
        })
        .collect()
}

/// Benchmark index construction
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for &count in &[100usize, 1000, 10_000] {
        let nodes = random_nodes(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &nodes, |b, nodes| {
            b.iter(|| SpatialIndex::build(black_box(nodes), usize::MAX))
        });
    }
    group.finish();
}

/// Benchmark viewport queries, from zoomed in to the whole map
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewport_query");
    let index = SpatialIndex::build(&random_nodes(10_000), usize::MAX);
    let mut out = Vec::with_capacity(200);

    for &extent in &[250.0f32, 1000.0, 4000.0, 10_000.0] {
        let viewport = Rect::new(5000.0 - extent / 2.0, 5000.0 + extent / 2.0, 5000.0 - extent / 2.0, 5000.0 + extent / 2.0);
        group.bench_with_input(BenchmarkId::new("extent", extent as u32), &viewport, |b, vp| {
            b.iter(|| {
                index.query_into(black_box(vp), 50.0, 200, &mut out);
                out.len()
            })
        });
    }
    group.finish();
}

/// Benchmark one simulation step over a full pool
fn bench_particles(c: &mut Criterion) {
    let mut group = c.benchmark_group("particles");
    let mut ps = ParticleSystem::new(ParticleConfig {
        particle_lifetime: 1.0e6,
        seed: Some(1),
        ..ParticleConfig::default()
    });
    ps.emit(Vec2::ZERO, ps.capacity());
    let mut vertices = Vec::with_capacity(ps.max_vertices());

    group.throughput(Throughput::Elements(ps.capacity() as u64));
    group.bench_function("update", |b| b.iter(|| ps.update(black_box(1.0 / 60.0))));
    group.bench_function("write_vertices", |b| {
        b.iter(|| {
            ps.write_vertices(&mut vertices);
            vertices.len()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_query, bench_particles);
criterion_main!(benches);
