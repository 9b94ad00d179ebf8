//! Destination edge remapping.

use std::collections::BTreeMap;

use nalgebra::Point3;

use crate::error::Result;
use crate::geometry::math::slerp_normals_safe;
use crate::geometry::{apply_normal_opt, apply_opt};
use crate::mesh::PolyMesh;
use crate::spatial::{NearestHit, SpatialQuery};

use super::map::ItemSources;
use super::progress::Progress;
use super::{
    begin, define_topology, resolve_batched, CorrespondenceMap, ElementKind, RemapMode,
    RemapOptions, RemapStatus,
};

const EDGE_RAYS_MIN: usize = 5;
const EDGE_RAYS_MAX: usize = 100;

/// Compute the sources of every edge of `dst`.
///
/// `map` is reset to one item per destination edge.
///
/// # Errors
///
/// Invalid options, or [`Topology`](RemapMode::Topology) with differing
/// edge counts.
pub fn remap_edges(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
) -> Result<RemapStatus> {
    remap_edges_internal(mode, src, dst, options, map, None)
}

/// Edge remapping with progress reporting.
pub fn remap_edges_with_progress(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: &Progress,
) -> Result<RemapStatus> {
    remap_edges_internal(mode, src, dst, options, map, Some(progress))
}

fn remap_edges_internal(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: Option<&Progress>,
) -> Result<RemapStatus> {
    let n = dst.num_edges();
    if !begin(ElementKind::Edge, mode, src.num_edges(), n, options, map)? {
        return Ok(RemapStatus::UnsupportedMode);
    }

    let items = match mode {
        RemapMode::Topology => {
            define_topology(map);
            return Ok(RemapStatus::Complete);
        }
        RemapMode::EdgeVertNearest => edge_vert_nearest(src, dst, options, progress),
        RemapMode::EdgeNearest => {
            let tree = src.bvh_edges();
            let transform = options.transform();
            let max_dist_sq = options.max_distance_sq();
            resolve_batched(
                n,
                options.parallel,
                progress,
                "Remapping edges",
                || SpatialQuery::new(tree),
                |query, e| {
                    let mid = apply_opt(transform, &dst.edge_midpoint(e));
                    match query.nearest(&mid, max_dist_sq) {
                        Some(hit) => ItemSources::single(hit.index, 0),
                        None => ItemSources::invalid(),
                    }
                },
            )
        }
        RemapMode::EdgePolyNearest => {
            let tree = src.bvh_tris();
            let tri_faces = src.tri_faces();
            let transform = options.transform();
            let max_dist_sq = options.max_distance_sq();
            resolve_batched(
                n,
                options.parallel,
                progress,
                "Remapping edges",
                || SpatialQuery::new(tree),
                |query, e| {
                    let mid = apply_opt(transform, &dst.edge_midpoint(e));
                    let Some(hit) = query.nearest(&mid, max_dist_sq) else {
                        return ItemSources::invalid();
                    };
                    closest_face_edge(src, tri_faces[hit.index], &mid)
                        .map_or_else(ItemSources::invalid, |edge| ItemSources::single(edge, 0))
                },
            )
        }
        RemapMode::EdgeInterpNormalProjected => edge_interp_projected(src, dst, options, progress),
        _ => return Ok(RemapStatus::UnsupportedMode),
    };

    map.define_all(items);
    Ok(RemapStatus::Complete)
}

/// Edge of `face` whose midpoint is closest to `point`; the first wins ties.
fn closest_face_edge(src: &PolyMesh, face: usize, point: &Point3<f64>) -> Option<usize> {
    let mut best = None;
    let mut best_dist_sq = f64::MAX;
    for &edge in src.face_edges(face) {
        let d2 = (point - src.edge_midpoint(edge)).norm_squared();
        if d2 < best_dist_sq {
            best_dist_sq = d2;
            best = Some(edge);
        }
    }
    best
}

fn edge_vert_nearest(
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    progress: Option<&Progress>,
) -> Vec<ItemSources> {
    let transform = options.transform();
    let max_dist_sq = options.max_distance_sq();
    let tree = src.bvh_verts();
    let vert_to_edges = src.vert_to_edges();

    // Nearest source vertex of each destination vertex used by an edge.
    let mut used = vec![false; dst.num_vertices()];
    for &[v0, v1] in dst.edges() {
        used[v0] = true;
        used[v1] = true;
    }
    let nearest: Vec<Option<NearestHit>> = resolve_batched(
        dst.num_vertices(),
        options.parallel,
        None,
        "Finding nearest vertices",
        || SpatialQuery::new(tree),
        |query, v| {
            if !used[v] {
                return None;
            }
            query.nearest(&apply_opt(transform, dst.position(v)), max_dist_sq)
        },
    );

    resolve_batched(
        dst.num_edges(),
        options.parallel,
        progress,
        "Remapping edges",
        || (),
        |_, e| {
            let dst_edge = dst.edge(e);
            let mut best = None;
            let mut best_total = f64::MAX;
            for (side, &v_dst) in dst_edge.iter().enumerate() {
                let Some(hit) = nearest[v_dst] else {
                    continue;
                };
                let other_dst = apply_opt(transform, dst.position(dst_edge[1 - side]));
                for &e_src in &vert_to_edges[hit.index] {
                    let [a, b] = src.edge(e_src);
                    let other_src = if a == hit.index { b } else { a };
                    let total = hit.distance + (src.position(other_src) - other_dst).norm();
                    if total < best_total {
                        best_total = total;
                        best = Some(e_src);
                    }
                }
            }
            best.map_or_else(ItemSources::invalid, |edge| ItemSources::single(edge, 0))
        },
    )
}

/// Number of rays cast along a destination edge of length `len`.
fn edge_ray_count(len: f64, ray_radius: f64) -> usize {
    if ray_radius <= 0.0 {
        return EDGE_RAYS_MAX;
    }
    let count = (len / ray_radius).round();
    if count.is_nan() {
        EDGE_RAYS_MIN
    } else {
        (count.min(EDGE_RAYS_MAX as f64) as usize).max(EDGE_RAYS_MIN)
    }
}

fn edge_interp_projected(
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    progress: Option<&Progress>,
) -> Vec<ItemSources> {
    let transform = options.transform();
    let tree = src.bvh_edges();
    let normals = dst.vert_normals();

    resolve_batched(
        dst.num_edges(),
        options.parallel,
        progress,
        "Remapping edges",
        || (SpatialQuery::new(tree), BTreeMap::<usize, f64>::new()),
        |(query, weights), e| {
            let [v0, v1] = dst.edge(e);
            let co0 = apply_opt(transform, dst.position(v0));
            let co1 = apply_opt(transform, dst.position(v1));
            let no0 = apply_normal_opt(transform, &normals[v0]);
            let no1 = apply_normal_opt(transform, &normals[v1]);

            let grid = edge_ray_count((co1 - co0).norm(), options.ray_radius);
            weights.clear();
            let mut total = 0.0;
            for j in 0..grid {
                let fac = j as f64 / grid as f64;
                let co = co0 + (co1 - co0) * fac;
                let no = slerp_normals_safe(&no0, &no1, fac);
                for (radius, w) in options.ray_attempts() {
                    if let Some(hit) = query.raycast(&co, &no, radius, options.max_distance) {
                        *weights.entry(hit.index).or_insert(0.0) += w;
                        total += w;
                        break;
                    }
                }
            }

            // At least half of the rays must have found a source.
            if total > grid as f64 / 2.0 {
                let (indices, normalized): (Vec<usize>, Vec<f64>) =
                    weights.iter().map(|(&i, &w)| (i, w / total)).unzip();
                ItemSources::weighted(&indices, &normalized, 0)
            } else {
                ItemSources::invalid()
            }
        },
    )
}
