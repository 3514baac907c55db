//! Benchmarks for OBB tree construction and queries.
//!
//! Run with: cargo bench -p mesh-obb
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p mesh-obb -- --save-baseline main
//! 2. After changes: cargo bench -p mesh-obb -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mesh_obb::{CollisionParams, ObbTree, ObbTreeParams, PolyMesh};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};

// =============================================================================
// Test Mesh Generation
// =============================================================================

/// Create a UV sphere with `rings * segments * 2` triangles (roughly).
fn create_sphere(rings: u32, segments: u32) -> PolyMesh {
    let mut mesh = PolyMesh::new();
    let top = mesh.add_point(0.0, 0.0, 1.0);
    for r in 1..rings {
        let theta = std::f64::consts::PI * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = std::f64::consts::TAU * s as f64 / segments as f64;
            mesh.add_point(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
        }
    }
    let bottom = mesh.add_point(0.0, 0.0, -1.0);

    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + s % segments;
    for s in 0..segments {
        mesh.add_triangle([top, ring(1, s), ring(1, s + 1)]);
        mesh.add_triangle([bottom, ring(rings - 1, s + 1), ring(rings - 1, s)]);
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let (a, b) = (ring(r, s), ring(r, s + 1));
            let (c, d) = (ring(r + 1, s), ring(r + 1, s + 1));
            mesh.add_triangle([a, c, d]);
            mesh.add_triangle([a, d, b]);
        }
    }
    mesh
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_locator");
    for (rings, segments) in [(16, 32), (32, 64), (64, 128)] {
        let mesh = create_sphere(rings, segments);
        group.throughput(Throughput::Elements(mesh.cell_count() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(mesh.cell_count()),
            &mesh,
            |b, mesh| {
                b.iter(|| {
                    let mut tree = ObbTree::with_data_set(black_box(mesh));
                    tree.build_locator().unwrap();
                    tree.node_count()
                })
            },
        );
    }
    group.finish();
}

fn bench_line_queries(c: &mut Criterion) {
    let mesh = create_sphere(64, 128);
    let mut tree = ObbTree::with_data_set(&mesh);
    tree.build_locator().unwrap();

    let rays: Vec<(Point3<f64>, Point3<f64>)> = (0..64)
        .map(|i| {
            let a = i as f64 * 0.1;
            (
                Point3::new(0.3 * a.cos(), 0.3 * a.sin(), -5.0),
                Point3::new(0.2 * a.sin(), 0.2 * a.cos(), 5.0),
            )
        })
        .collect();

    c.bench_function("intersect_with_line_64_rays", |b| {
        b.iter(|| {
            rays.iter()
                .filter_map(|(a0, a1)| tree.intersect_with_line(black_box(a0), black_box(a1), 0.0))
                .count()
        })
    });

    c.bench_function("intersect_with_line_all_64_rays", |b| {
        b.iter(|| {
            rays.iter()
                .map(|(a0, a1)| tree.intersect_with_line_all(a0, a1, 0.0).len())
                .sum::<usize>()
        })
    });
}

fn bench_tree_collision(c: &mut Criterion) {
    let mesh = create_sphere(32, 64);
    let params = ObbTreeParams::default().with_cells_per_bucket(8);
    let mut tree = ObbTree::with_params(&mesh, params);
    tree.build_locator().unwrap();

    let xform = Isometry3::from_parts(
        Translation3::new(1.2, 0.3, 0.1),
        UnitQuaternion::from_euler_angles(0.2, 0.4, 0.1),
    )
    .to_homogeneous();

    c.bench_function("intersect_with_obb_tree_leaf_pairs", |b| {
        b.iter(|| tree.intersect_with_obb_tree(&tree, Some(black_box(&xform)), |_, _, _| 1))
    });

    c.bench_function("find_intersecting_cells", |b| {
        b.iter(|| {
            tree.find_intersecting_cells(&tree, Some(&xform), &CollisionParams::default())
                .pairs
                .len()
        })
    });
}

criterion_group!(benches, bench_build, bench_line_queries, bench_tree_collision);
criterion_main!(benches);
