//! Destination vertex remapping.

use crate::error::Result;
use crate::geometry::math::line_point_factor;
use crate::geometry::{apply_normal_opt, apply_opt};
use crate::mesh::PolyMesh;
use crate::spatial::SpatialQuery;

use super::map::ItemSources;
use super::progress::Progress;
use super::scratch::{FaceSource, InterpScratch};
use super::{
    begin, define_topology, resolve_batched, CorrespondenceMap, ElementKind, RemapMode,
    RemapOptions, RemapStatus,
};

/// Compute the sources of every vertex of `dst`.
///
/// `map` is reset to one item per destination vertex.
///
/// # Errors
///
/// Invalid options, or [`Topology`](RemapMode::Topology) with differing
/// vertex counts.
///
/// # Example
///
/// ```
/// use meshpair::prelude::*;
/// use nalgebra::Point3;
///
/// let source = PolyMesh::from_edges(
///     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
///     &[[0, 1]],
/// )
/// .unwrap();
/// let destination = PolyMesh::from_points(vec![Point3::new(1.0, 0.0, 0.0)]);
///
/// let mut map = CorrespondenceMap::default();
/// remap_verts(
///     RemapMode::VertEdgeInterpNearest,
///     &source,
///     &destination,
///     &RemapOptions::default(),
///     &mut map,
/// )
/// .unwrap();
/// assert_eq!(map.item(0).weights, &[0.5, 0.5]);
/// ```
pub fn remap_verts(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
) -> Result<RemapStatus> {
    remap_verts_internal(mode, src, dst, options, map, None)
}

/// Vertex remapping with progress reporting.
pub fn remap_verts_with_progress(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: &Progress,
) -> Result<RemapStatus> {
    remap_verts_internal(mode, src, dst, options, map, Some(progress))
}

fn remap_verts_internal(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: Option<&Progress>,
) -> Result<RemapStatus> {
    let n = dst.num_vertices();
    if !begin(ElementKind::Vertex, mode, src.num_vertices(), n, options, map)? {
        return Ok(RemapStatus::UnsupportedMode);
    }

    let message = "Remapping vertices";
    let transform = options.transform();
    let max_dist_sq = options.max_distance_sq();
    let positions = dst.positions();

    let items = match mode {
        RemapMode::Topology => {
            define_topology(map);
            return Ok(RemapStatus::Complete);
        }
        RemapMode::VertNearest => {
            let tree = src.bvh_verts();
            resolve_batched(
                n,
                options.parallel,
                progress,
                message,
                || SpatialQuery::new(tree),
                |query, v| {
                    let co = apply_opt(transform, &positions[v]);
                    match query.nearest(&co, max_dist_sq) {
                        Some(hit) => ItemSources::single(hit.index, 0),
                        None => ItemSources::invalid(),
                    }
                },
            )
        }
        RemapMode::VertEdgeNearest | RemapMode::VertEdgeInterpNearest => {
            let tree = src.bvh_edges();
            let interpolate = mode == RemapMode::VertEdgeInterpNearest;
            resolve_batched(
                n,
                options.parallel,
                progress,
                message,
                || SpatialQuery::new(tree),
                |query, v| {
                    let co = apply_opt(transform, &positions[v]);
                    let Some(hit) = query.nearest(&co, max_dist_sq) else {
                        return ItemSources::invalid();
                    };
                    let [v0, v1] = src.edge(hit.index);
                    let (p0, p1) = (src.position(v0), src.position(v1));
                    if interpolate {
                        // Weight of v0 is the factor measured from v1 towards v0.
                        let w0 = line_point_factor(&co, p1, p0).clamp(0.0, 1.0);
                        ItemSources::weighted(&[v0, v1], &[w0, 1.0 - w0], 0)
                    } else {
                        let d0 = (co - p0).norm_squared();
                        let d1 = (co - p1).norm_squared();
                        ItemSources::single(if d0 > d1 { v1 } else { v0 }, 0)
                    }
                },
            )
        }
        RemapMode::VertFaceNearest | RemapMode::VertPolyInterpNearest => {
            let tree = src.bvh_tris();
            let tri_faces = src.tri_faces();
            resolve_batched(
                n,
                options.parallel,
                progress,
                message,
                || (SpatialQuery::new(tree), InterpScratch::default()),
                |(query, scratch), v| {
                    let co = apply_opt(transform, &positions[v]);
                    let Some(hit) = query.nearest(&co, max_dist_sq) else {
                        return ItemSources::invalid();
                    };
                    let face = tri_faces[hit.index];
                    if mode == RemapMode::VertFaceNearest {
                        let vert = scratch.closest_corner(src, face, &hit.point, FaceSource::Verts);
                        ItemSources::single(vert, 0)
                    } else {
                        scratch.face_weights(src, face, &hit.point, FaceSource::Verts, 0)
                    }
                },
            )
        }
        RemapMode::VertPolyInterpNormalProjected => {
            let tree = src.bvh_tris();
            let tri_faces = src.tri_faces();
            let normals = dst.vert_normals();
            resolve_batched(
                n,
                options.parallel,
                progress,
                message,
                || (SpatialQuery::new(tree), InterpScratch::default()),
                |(query, scratch), v| {
                    let co = apply_opt(transform, &positions[v]);
                    let no = apply_normal_opt(transform, &normals[v]);
                    match query.raycast(&co, &no, options.ray_radius, options.max_distance) {
                        Some(hit) => scratch.face_weights(
                            src,
                            tri_faces[hit.index],
                            &hit.point,
                            FaceSource::Verts,
                            0,
                        ),
                        None => ItemSources::invalid(),
                    }
                },
            )
        }
        _ => return Ok(RemapStatus::UnsupportedMode),
    };

    map.define_all(items);
    Ok(RemapStatus::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SpaceTransform;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Point3, Vector3};

    fn run(mode: RemapMode, src: &PolyMesh, dst: &PolyMesh, options: &RemapOptions) -> CorrespondenceMap {
        let mut map = CorrespondenceMap::default();
        let status = remap_verts(mode, src, dst, options, &mut map).unwrap();
        assert_eq!(status, RemapStatus::Complete);
        map
    }

    fn assert_normalized(map: &CorrespondenceMap) {
        for item in map.iter().filter(|i| !i.is_empty()) {
            assert!((item.weights.iter().sum::<f64>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_topology_identity() {
        let cube = fixtures::cube();
        let map = run(RemapMode::Topology, &cube, &cube, &RemapOptions::default());
        for (i, item) in map.iter().enumerate() {
            assert_eq!(item.sources, &[i]);
            assert_eq!(item.weights, &[1.0]);
        }
    }

    #[test]
    fn test_nearest_beyond_max_distance_is_empty() {
        let cube = fixtures::cube();
        let far = PolyMesh::from_points(vec![Point3::new(100.0, 100.0, 100.0)]);
        let options = RemapOptions::default().with_max_distance(1.0);
        for mode in [
            RemapMode::VertNearest,
            RemapMode::VertEdgeNearest,
            RemapMode::VertEdgeInterpNearest,
            RemapMode::VertFaceNearest,
            RemapMode::VertPolyInterpNearest,
        ] {
            let map = run(mode, &cube, &far, &options);
            assert!(map.item(0).is_empty(), "{mode} found a source");
        }
    }

    #[test]
    fn test_nearest_vertex_sequential_matches_parallel() {
        let src = fixtures::grid(6, 6);
        let dst = fixtures::grid_at(5, 5, 0.3);
        let par = run(RemapMode::VertNearest, &src, &dst, &RemapOptions::default());
        let seq = run(RemapMode::VertNearest, &src, &dst, &RemapOptions::default().sequential());
        assert_eq!(par, seq);
        assert_eq!(par.item(7).sources, &[8]);
    }

    #[test]
    fn test_edge_interp_weights() {
        let src = PolyMesh::from_edges(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            &[[0, 1]],
        )
        .unwrap();
        let dst = PolyMesh::from_points(vec![
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(-3.0, 1.0, 0.0),
        ]);
        let map = run(RemapMode::VertEdgeInterpNearest, &src, &dst, &RemapOptions::default());

        let item = map.item(0);
        assert_eq!(item.sources, &[0, 1]);
        assert_relative_eq!(item.weights[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(item.weights[1], 0.75, epsilon = 1e-12);

        // Midpoint: equal weights, and the weights reproduce the projection.
        let item = map.item(1);
        assert_relative_eq!(item.weights[0], 0.5, epsilon = 1e-12);
        let p = item
            .interpolate(|v| src.position(v).coords)
            .unwrap();
        assert_relative_eq!(p, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);

        // Beyond the end: clamped.
        assert_eq!(map.item(2).weights, &[1.0, 0.0]);
    }

    #[test]
    fn test_edge_nearest_picks_closer_endpoint() {
        let src = PolyMesh::from_edges(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            &[[0, 1]],
        )
        .unwrap();
        let dst = PolyMesh::from_points(vec![Point3::new(1.6, 0.5, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        let map = run(RemapMode::VertEdgeNearest, &src, &dst, &RemapOptions::default());
        assert_eq!(map.item(0).sources, &[1]);
        // Equidistant: the first endpoint.
        assert_eq!(map.item(1).sources, &[0]);
    }

    #[test]
    fn test_face_modes_on_grid() {
        let src = fixtures::grid(2, 2);
        let dst = PolyMesh::from_points(vec![Point3::new(0.9, 1.2, 0.4), Point3::new(1.5, 0.5, -0.2)]);

        let map = run(RemapMode::VertFaceNearest, &src, &dst, &RemapOptions::default());
        assert_eq!(map.item(0).sources, &[4]);

        let map = run(RemapMode::VertPolyInterpNearest, &src, &dst, &RemapOptions::default());
        assert_normalized(&map);
        let item = map.item(1);
        assert_eq!(item.sources, &[1, 2, 5, 4]);
        for w in item.weights {
            assert_relative_eq!(*w, 0.25, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normal_projection_uses_transformed_normals() {
        // Source quad in the XZ plane at y = 2; destination vertices face +Z
        // until rotated onto +Y by the transform.
        let src = PolyMesh::from_quads(
            vec![
                Point3::new(-2.0, 2.0, -2.0),
                Point3::new(2.0, 2.0, -2.0),
                Point3::new(2.0, 2.0, 2.0),
                Point3::new(-2.0, 2.0, 2.0),
            ],
            &[[0, 1, 2, 3]],
        )
        .unwrap();
        let dst = fixtures::grid(1, 1);

        let map = run(RemapMode::VertPolyInterpNormalProjected, &src, &dst, &RemapOptions::default());
        assert_eq!(map.valid_count(), 0);

        let rot = nalgebra::Rotation3::from_axis_angle(&Vector3::x_axis(), -std::f64::consts::FRAC_PI_2);
        let transform = SpaceTransform::from_matrix(Matrix4::from(rot));
        let options = RemapOptions::default().with_space_transform(transform);
        let map = run(RemapMode::VertPolyInterpNormalProjected, &src, &dst, &options);
        assert_eq!(map.valid_count(), 4);
        assert_normalized(&map);
    }

    #[test]
    fn test_unsupported_mode() {
        let cube = fixtures::cube();
        let mut map = CorrespondenceMap::default();
        let options = RemapOptions::default().with_diagnostics(crate::remap::Diagnostics::none());
        let status = remap_verts(RemapMode::EdgeNearest, &cube, &cube, &options, &mut map).unwrap();
        assert_eq!(status, RemapStatus::UnsupportedMode);
        assert_eq!(map.len(), 8);
        assert_eq!(map.valid_count(), 0);
    }
}
