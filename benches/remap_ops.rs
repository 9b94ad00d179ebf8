//! Benchmarks for remap operations.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use meshpair::prelude::*;
use meshpair::remap::find_best_match;
use nalgebra::Point3;

/// A wavy `n` x `n` quad grid, so that nearest and ray queries have work to do.
fn create_grid_mesh(n: usize, z: f64, phase: f64) -> PolyMesh {
    let mut positions = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n);

    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as f64, j as f64);
            positions.push(Point3::new(x, y, z + 0.2 * (0.3 * x + phase).sin()));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            faces.push([v00, v00 + 1, v00 + n + 2, v00 + n + 1]);
        }
    }

    PolyMesh::from_quads(positions, &faces).unwrap()
}

fn bench_vert_modes(c: &mut Criterion) {
    let src = create_grid_mesh(60, 0.0, 0.0);
    let dst = create_grid_mesh(45, 0.1, 0.5);
    let mut group = c.benchmark_group("remap_verts");

    for mode in [
        RemapMode::VertNearest,
        RemapMode::VertPolyInterpNearest,
        RemapMode::VertPolyInterpNormalProjected,
    ] {
        for parallel in [false, true] {
            let options = RemapOptions::default().with_parallel(parallel);
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(mode.name(), label), &options, |b, options| {
                let mut map = CorrespondenceMap::default();
                b.iter(|| remap_verts(mode, &src, &dst, options, &mut map).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_corner_islands(c: &mut Criterion) {
    let mut src = create_grid_mesh(40, 0.0, 0.0);
    // A vertical seam down the middle, plus a short inner cut.
    for j in 0..40 {
        src.mark_seam(j * 41 + 20, (j + 1) * 41 + 20);
    }
    for i in 5..10 {
        src.mark_seam(10 * 41 + i, 10 * 41 + i + 1);
    }
    let dst = create_grid_mesh(30, 0.1, 0.3);

    let mut group = c.benchmark_group("remap_corners");
    for precision in [0.0, 0.5] {
        let options = RemapOptions::default().with_islands_precision(precision);
        group.bench_with_input(
            BenchmarkId::new("poly_interp_nearest", precision),
            &options,
            |b, options| {
                let mut map = CorrespondenceMap::default();
                b.iter(|| {
                    remap_corners(
                        RemapMode::CornerPolyInterpNearest,
                        &src,
                        &dst,
                        Some(&SeamIslands),
                        options,
                        &mut map,
                    )
                    .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_face_projection(c: &mut Criterion) {
    let src = create_grid_mesh(40, 0.0, 0.0);
    let dst = create_grid_mesh(10, 0.5, 0.0);
    let options = RemapOptions::default().with_ray_radius(0.05);

    c.bench_function("remap_faces_poly_interp_projected", |b| {
        let mut map = CorrespondenceMap::default();
        b.iter(|| {
            remap_faces(
                RemapMode::FacePolyInterpNormalProjected,
                &src,
                &dst,
                &options,
                &mut map,
            )
            .unwrap()
        });
    });
}

fn bench_alignment(c: &mut Criterion) {
    let src = create_grid_mesh(30, 0.0, 0.0);
    let dst = create_grid_mesh(30, 2.0, 0.0);

    c.bench_function("find_best_match_30x30", |b| {
        b.iter(|| find_best_match(dst.positions(), &src));
    });
}

criterion_group!(
    benches,
    bench_vert_modes,
    bench_corner_islands,
    bench_face_projection,
    bench_alignment
);
criterion_main!(benches);
