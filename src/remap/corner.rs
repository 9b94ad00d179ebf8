//! Destination face corner remapping, island aware.
//!
//! Every corner of a destination face is first resolved against each source
//! island separately. The island scoring best over the whole face wins, so
//! all corners of one face draw from the same island. When consecutive
//! corners land on different source faces, a bounded A* search over the
//! island's face graph checks whether the two faces are separated by an
//! inner cut; if so, the corner is pulled back onto the face before the cut.

use nalgebra::{Point3, Vector3};

use crate::error::Result;
use crate::geometry::{apply_normal_opt, apply_opt};
use crate::mesh::PolyMesh;
use crate::spatial::{Bvh, SpatialQuery};

use super::astar::AStarSolver;
use super::graph::IslandGraph;
use super::islands::{IslandClassifier, IslandStore};
use super::map::ItemSources;
use super::progress::Progress;
use super::scratch::{FaceSource, InterpScratch};
use super::{
    begin, define_topology, resolve_batched, CorrespondenceMap, ElementKind, RemapMode,
    RemapOptions, RemapStatus, ASTAR_STEPS_MAX,
};

/// Score of an exact (zero distance) hit.
const EXACT_HIT_FACTOR: f64 = 1e18;

/// Tolerance when comparing normal dot products of candidate corners.
const NORMAL_DOT_EPS: f64 = 1e-6;

/// Compute the sources of every face corner of `dst`.
///
/// `classifier` splits the source mesh into islands; with `None` (or when it
/// reports no islands) the whole source mesh is one island. Item islands
/// record the source island each corner was resolved in.
///
/// # Errors
///
/// Invalid options, or [`Topology`](RemapMode::Topology) with differing
/// corner counts.
///
/// # Example
///
/// ```
/// use meshpair::prelude::*;
/// use nalgebra::Point3;
///
/// let quad = |z: f64| {
///     PolyMesh::from_quads(
///         vec![
///             Point3::new(0.0, 0.0, z),
///             Point3::new(1.0, 0.0, z),
///             Point3::new(1.0, 1.0, z),
///             Point3::new(0.0, 1.0, z),
///         ],
///         &[[0, 1, 2, 3]],
///     )
///     .unwrap()
/// };
///
/// let mut map = CorrespondenceMap::default();
/// remap_corners(
///     RemapMode::CornerPolyNearest,
///     &quad(0.0),
///     &quad(0.5),
///     Some(&SeamIslands),
///     &RemapOptions::default(),
///     &mut map,
/// )
/// .unwrap();
/// assert_eq!(map.item(2).sources, &[2]);
/// ```
pub fn remap_corners(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    classifier: Option<&dyn IslandClassifier>,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
) -> Result<RemapStatus> {
    remap_corners_internal(mode, src, dst, classifier, options, map, None)
}

/// Corner remapping with progress reporting.
pub fn remap_corners_with_progress(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    classifier: Option<&dyn IslandClassifier>,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: &Progress,
) -> Result<RemapStatus> {
    remap_corners_internal(mode, src, dst, classifier, options, map, Some(progress))
}

/// Number of A* steps allowed for a given islands precision (0 disables).
fn astar_steps(precision: f64) -> usize {
    if precision > 0.0 {
        ((ASTAR_STEPS_MAX as f64 * precision).round() as usize).max(1)
    } else {
        0
    }
}

/// Quality of a hit at distance `dist`, scaled by `weight`.
#[inline]
fn hit_factor(weight: f64, dist: f64) -> f64 {
    if dist > 0.0 {
        weight / dist
    } else {
        EXACT_HIT_FACTOR
    }
}

/// Resolution of one destination corner within one source island.
#[derive(Debug, Clone, Copy)]
struct IslandResult {
    /// Hit quality; the island with the best mean factor wins.
    factor: f64,
    /// Source corner (vertex based modes) or source face (others).
    index: Option<usize>,
    hit_point: Point3<f64>,
}

impl IslandResult {
    fn miss() -> Self {
        Self {
            factor: 0.0,
            index: None,
            hit_point: Point3::origin(),
        }
    }
}

/// Read-only state shared by every worker.
struct CornerContext<'a> {
    mode: RemapMode,
    src: &'a PolyMesh,
    dst: &'a PolyMesh,
    options: &'a RemapOptions,
    store: Option<&'a IslandStore>,
    trees: Vec<&'a Bvh>,
    graphs: Vec<IslandGraph>,
    steps: usize,
}

/// Per-thread buffers.
struct CornerWorker<'a> {
    queries: Vec<SpatialQuery<'a>>,
    results: Vec<Vec<IslandResult>>,
    scratch: InterpScratch,
    solver: AStarSolver,
}

impl<'a> CornerContext<'a> {
    fn from_vert(&self) -> bool {
        matches!(
            self.mode,
            RemapMode::CornerNearestCornerNormal | RemapMode::CornerNearestFaceNormal
        )
    }

    fn worker(&self) -> CornerWorker<'a> {
        CornerWorker {
            queries: self.trees.iter().map(|&t| SpatialQuery::new(t)).collect(),
            results: vec![Vec::new(); self.trees.len()],
            scratch: InterpScratch::default(),
            solver: AStarSolver::new(),
        }
    }

    fn in_island(&self, face: usize, island: usize) -> bool {
        self.store.map_or(true, |s| s.island_of_face(face) == island)
    }

    fn resolve_face(&self, worker: &mut CornerWorker<'a>, f: usize) -> Vec<ItemSources> {
        let transform = self.options.transform();
        let corners = self.dst.face_corners(f);

        let face_no = (self.mode == RemapMode::CornerNearestFaceNormal)
            .then(|| apply_normal_opt(transform, &self.dst.face_normals()[f]));
        let face_center = apply_opt(transform, &self.dst.face_centers()[f]);

        for (island, (query, results)) in worker
            .queries
            .iter_mut()
            .zip(worker.results.iter_mut())
            .enumerate()
        {
            results.clear();
            for c in corners.clone() {
                let result = if self.from_vert() {
                    self.nearest_by_normal(query, island, c, face_no.as_ref(), &face_center)
                } else if self.mode == RemapMode::CornerPolyInterpNormalProjected {
                    self.projected(query, c)
                } else {
                    self.nearest_face(query, c)
                };
                results.push(result);
            }
        }

        // Best mean factor; an island must score above zero.
        let mut best = None;
        let mut best_factor = 0.0;
        for (island, results) in worker.results.iter().enumerate() {
            let factor = results.iter().map(|r| r.factor).sum::<f64>() / corners.len() as f64;
            if factor > best_factor {
                best_factor = factor;
                best = Some(island);
            }
        }
        let Some(best) = best else {
            return vec![ItemSources::invalid(); corners.len()];
        };

        let graph = (self.steps > 0).then(|| &self.graphs[best]);
        let mut prev_face = None;
        let mut items = Vec::with_capacity(corners.len());

        for (k, c) in corners.enumerate() {
            let result = worker.results[best][k];
            let Some(index) = result.index else {
                items.push(ItemSources::invalid_in(best));
                continue;
            };
            let co = apply_opt(transform, self.dst.position(self.dst.corner_verts()[c]));

            let mut face = if self.from_vert() {
                self.src.corner_faces()[index]
            } else {
                index
            };
            let mut corrected = None;
            if let (Some(graph), Some(prev)) = (graph, prev_face) {
                if prev != face {
                    corrected = graph.face_before_cut(&mut worker.solver, prev, face, self.steps);
                }
            }
            if let Some(valid) = corrected {
                face = valid;
            }

            let item = if self.from_vert() {
                let corner = match corrected {
                    Some(valid) => worker
                        .scratch
                        .closest_corner(self.src, valid, &co, FaceSource::Corners),
                    None => index,
                };
                ItemSources::single(corner, best)
            } else {
                let hit = match corrected {
                    Some(valid) => self.src.closest_point_on_face(valid, &co),
                    None => result.hit_point,
                };
                if self.mode == RemapMode::CornerPolyNearest {
                    let corner = worker
                        .scratch
                        .closest_corner(self.src, face, &hit, FaceSource::Corners);
                    ItemSources::single(corner, best)
                } else {
                    worker
                        .scratch
                        .face_weights(self.src, face, &hit, FaceSource::Corners, best)
                }
            };
            items.push(item);
            prev_face = Some(face);
        }
        items
    }

    /// Corner (or face) around the nearest source vertex whose normal best
    /// matches the destination one.
    fn nearest_by_normal(
        &self,
        query: &mut SpatialQuery<'_>,
        island: usize,
        c: usize,
        face_no: Option<&Vector3<f64>>,
        face_center: &Point3<f64>,
    ) -> IslandResult {
        let transform = self.options.transform();
        let co = apply_opt(transform, self.dst.position(self.dst.corner_verts()[c]));
        query.reset();
        let Some(hit) = query.nearest(&co, self.options.max_distance_sq()) else {
            return IslandResult::miss();
        };

        let src = self.src;
        let by_corner = self.mode == RemapMode::CornerNearestCornerNormal;
        let (nor_dst, nors_src, candidates) = match face_no {
            Some(no) if !by_corner => (*no, src.face_normals(), &src.vert_to_faces()[hit.index]),
            _ => (
                apply_normal_opt(transform, &self.dst.corner_normals()[c]),
                src.corner_normals(),
                &src.vert_to_corners()[hit.index],
            ),
        };

        let mut best_dot = -2.0;
        let mut best_dist_sq = f64::MAX;
        let mut best = None;
        for &candidate in candidates {
            let face = if by_corner {
                src.corner_faces()[candidate]
            } else {
                candidate
            };
            // A vertex may sit on the border of several islands.
            if !self.in_island(face, island) {
                continue;
            }
            let dot = nors_src[candidate].dot(&nor_dst);
            if dot > best_dot - NORMAL_DOT_EPS {
                // Equal normals: prefer the face whose center is closest.
                let dist_sq = (face_center - src.face_centers()[face]).norm_squared();
                if dot > best_dot + NORMAL_DOT_EPS || dist_sq < best_dist_sq {
                    best_dot = dot;
                    best_dist_sq = dist_sq;
                    best = Some(candidate);
                }
            }
        }

        let Some(best) = best else {
            return IslandResult::miss();
        };
        let corner = if by_corner {
            best
        } else {
            src.face_corners(best)
                .find(|&corner| src.corner_verts()[corner] == hit.index)
                .unwrap_or(best)
        };
        IslandResult {
            factor: hit_factor((best_dot + 1.0) * 0.5, hit.distance),
            index: Some(corner),
            hit_point: hit.point,
        }
    }

    /// Source face hit along the corner normal; falls back to a zero-score
    /// nearest hit so that faces stay complete.
    fn projected(&self, query: &mut SpatialQuery<'_>, c: usize) -> IslandResult {
        let transform = self.options.transform();
        let co = apply_opt(transform, self.dst.position(self.dst.corner_verts()[c]));
        let no = apply_normal_opt(transform, &self.dst.corner_normals()[c]);
        let tri_faces = self.src.tri_faces();

        for (radius, w) in self.options.ray_attempts() {
            if let Some(hit) = query.raycast(&co, &no, radius, self.options.max_distance) {
                return IslandResult {
                    factor: hit_factor(1.0, hit.distance) * w,
                    index: Some(tri_faces[hit.index]),
                    hit_point: hit.point,
                };
            }
        }

        query.reset();
        match query.nearest(&co, self.options.max_distance_sq()) {
            Some(hit) => IslandResult {
                factor: 0.0,
                index: Some(tri_faces[hit.index]),
                hit_point: hit.point,
            },
            None => IslandResult::miss(),
        }
    }

    fn nearest_face(&self, query: &mut SpatialQuery<'_>, c: usize) -> IslandResult {
        let co = apply_opt(
            self.options.transform(),
            self.dst.position(self.dst.corner_verts()[c]),
        );
        query.reset();
        match query.nearest(&co, self.options.max_distance_sq()) {
            Some(hit) => IslandResult {
                factor: hit_factor(1.0, hit.distance),
                index: Some(self.src.tri_faces()[hit.index]),
                hit_point: hit.point,
            },
            None => IslandResult::miss(),
        }
    }
}

fn remap_corners_internal(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    classifier: Option<&dyn IslandClassifier>,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: Option<&Progress>,
) -> Result<RemapStatus> {
    if !begin(
        ElementKind::Corner,
        mode,
        src.num_corners(),
        dst.num_corners(),
        options,
        map,
    )? {
        return Ok(RemapStatus::UnsupportedMode);
    }
    if mode == RemapMode::Topology {
        define_topology(map);
        return Ok(RemapStatus::Complete);
    }
    let from_vert = matches!(
        mode,
        RemapMode::CornerNearestCornerNormal | RemapMode::CornerNearestFaceNormal
    );
    let store = classifier
        .and_then(|c| c.classify(src))
        .filter(|s| !s.is_empty());
    let num_trees = store.as_ref().map_or(1, IslandStore::len);
    let steps = astar_steps(options.islands_precision);
    options.diagnostics.debug(&format!(
        "corner remapping over {num_trees} source island(s), {steps} path steps"
    ));

    // Search structures per island, restricted to the island's elements.
    let mut island_trees = Vec::new();
    let mut graphs = Vec::new();
    for island in 0..num_trees {
        if let Some(store) = &store {
            let faces = &store.island(island).faces;
            island_trees.push(if from_vert {
                let mut active = vec![false; src.num_vertices()];
                for &f in faces {
                    for &v in src.face_verts(f) {
                        active[v] = true;
                    }
                }
                Bvh::from_points(
                    src.positions(),
                    (0..src.num_vertices()).filter(|&v| active[v]),
                )
            } else {
                src.build_tri_bvh(faces.iter().flat_map(|&f| src.face_tris(f)))
            });
        }
        if steps > 0 {
            graphs.push(match &store {
                Some(store) => IslandGraph::for_island(src, store, island),
                None => IslandGraph::whole_mesh(src),
            });
        }
        if let Some(p) = progress {
            p.report(island + 1, num_trees, "Preparing source islands");
        }
    }
    let trees: Vec<&Bvh> = if store.is_some() {
        island_trees.iter().collect()
    } else if from_vert {
        vec![src.bvh_verts()]
    } else {
        vec![src.bvh_tris()]
    };

    let context = CornerContext {
        mode,
        src,
        dst,
        options,
        store: store.as_ref(),
        trees,
        graphs,
        steps,
    };
    let faces = resolve_batched(
        dst.num_faces(),
        options.parallel,
        progress,
        "Remapping corners",
        || context.worker(),
        |worker, f| context.resolve_face(worker, f),
    );

    for (f, items) in faces.iter().enumerate() {
        for (c, item) in dst.face_corners(f).zip(items) {
            map.define_item(c, item);
        }
    }
    Ok(RemapStatus::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use crate::remap::SeamIslands;

    fn run(
        mode: RemapMode,
        src: &PolyMesh,
        dst: &PolyMesh,
        classifier: Option<&dyn IslandClassifier>,
        options: &RemapOptions,
    ) -> CorrespondenceMap {
        let mut map = CorrespondenceMap::default();
        let status = remap_corners(mode, src, dst, classifier, options, &mut map).unwrap();
        assert_eq!(status, RemapStatus::Complete);
        map
    }

    const CORNER_MODES: [RemapMode; 5] = [
        RemapMode::CornerNearestCornerNormal,
        RemapMode::CornerNearestFaceNormal,
        RemapMode::CornerPolyNearest,
        RemapMode::CornerPolyInterpNearest,
        RemapMode::CornerPolyInterpNormalProjected,
    ];

    fn from_vert(mode: RemapMode) -> bool {
        matches!(
            mode,
            RemapMode::CornerNearestCornerNormal | RemapMode::CornerNearestFaceNormal
        )
    }

    #[test]
    fn test_astar_steps() {
        assert_eq!(astar_steps(0.0), 0);
        assert_eq!(astar_steps(0.001), 1);
        assert_eq!(astar_steps(0.5), 32);
        assert_eq!(astar_steps(1.0), 64);
    }

    #[test]
    fn test_identity_on_lifted_grid() {
        let src = fixtures::grid(3, 2);
        let dst = fixtures::grid_at(3, 2, 0.25);
        for mode in CORNER_MODES {
            for classifier in [None, Some(&SeamIslands as &dyn IslandClassifier)] {
                let options = RemapOptions::default().with_islands_precision(0.5);
                let map = run(mode, &src, &dst, classifier, &options);
                for (c, item) in map.iter().enumerate() {
                    assert_eq!(item.island, 0);
                    // Interpolating modes snap onto a corner of the same
                    // vertex; which of its faces wins is up to the tree.
                    let (source, weight) = item
                        .iter()
                        .max_by(|a, b| a.1.total_cmp(&b.1))
                        .unwrap();
                    assert_eq!(src.corner_verts()[source], dst.corner_verts()[c], "{mode}");
                    assert!(weight > 1.0 - 1e-6, "{mode}");
                    if from_vert(mode) {
                        assert_eq!(source, c, "{mode}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_topology_and_unsupported() {
        let cube = fixtures::cube();
        let map = run(RemapMode::Topology, &cube, &cube, None, &RemapOptions::default());
        assert_eq!(map.len(), 24);
        assert_eq!(map.item(17).sources, &[17]);

        let mut map = CorrespondenceMap::default();
        let options = RemapOptions::default().with_diagnostics(crate::remap::Diagnostics::none());
        let status =
            remap_corners(RemapMode::FaceNearest, &cube, &cube, None, &options, &mut map).unwrap();
        assert_eq!(status, RemapStatus::UnsupportedMode);
        assert_eq!(map.valid_count(), 0);
    }

    #[test]
    fn test_face_never_spans_two_islands() {
        // A destination quad straddling the seam of a four-quad strip.
        let src = fixtures::seam_strip(4);
        let dst = PolyMesh::from_quads(
            vec![
                Point3::new(1.6, 0.1, 0.2),
                Point3::new(2.3, 0.1, 0.2),
                Point3::new(2.3, 0.9, 0.2),
                Point3::new(1.6, 0.9, 0.2),
            ],
            &[[0, 1, 2, 3]],
        )
        .unwrap();
        let store = SeamIslands.classify(&src).unwrap();

        for mode in CORNER_MODES {
            let map = run(mode, &src, &dst, Some(&SeamIslands), &RemapOptions::default());
            let island = map.item(0).island;
            for item in map.iter() {
                assert!(!item.is_empty(), "{mode}");
                assert_eq!(item.island, island, "{mode}");
                for (corner, _) in item.iter() {
                    let face = src.corner_faces()[corner];
                    assert_eq!(store.island_of_face(face), island, "{mode}");
                }
                assert!((item.weights.iter().sum::<f64>() - 1.0).abs() < 1e-5);
            }
        }

        // Without islands, the right half of the quad reads the right half
        // of the strip.
        let map = run(RemapMode::CornerPolyNearest, &src, &dst, None, &RemapOptions::default());
        let face = src.corner_faces()[map.item(1).sources[0]];
        assert_eq!(face, 2);
    }

    #[test]
    fn test_inner_cut_pulls_corner_back() {
        // One island with a seam between faces 1 and 4 of a 3 x 3 grid.
        let mut src = fixtures::grid(3, 3);
        assert!(src.mark_seam(5, 6));
        assert!(src.mark_seam(1, 5));

        // A thin destination triangle from the middle of face 1 up into
        // face 4, across the cut.
        let dst = PolyMesh::from_triangles(
            vec![
                Point3::new(1.5, 0.5, 0.0),
                Point3::new(1.6, 0.5, 0.0),
                Point3::new(1.4, 1.4, 0.0),
            ],
            &[[0, 1, 2]],
        )
        .unwrap();

        let plain = run(
            RemapMode::CornerPolyNearest,
            &src,
            &dst,
            Some(&SeamIslands),
            &RemapOptions::default(),
        );
        assert_eq!(src.corner_faces()[plain.item(2).sources[0]], 4);

        let options = RemapOptions::default().with_islands_precision(1.0);
        let corrected = run(RemapMode::CornerPolyNearest, &src, &dst, Some(&SeamIslands), &options);
        let corner = corrected.item(2).sources[0];
        assert_eq!(src.corner_faces()[corner], 1);
        // Corner of face 1 closest to (1.4, 1.0), the point facing (1.4, 1.4).
        assert_eq!(src.corner_verts()[corner], 5);
    }

    #[test]
    fn test_max_distance_misses() {
        let src = fixtures::grid(1, 1);
        let dst = fixtures::grid_at(1, 1, 4.0);
        let options = RemapOptions::default().with_max_distance(1.0);
        for mode in CORNER_MODES {
            let map = run(mode, &src, &dst, Some(&SeamIslands), &options);
            assert_eq!(map.valid_count(), 0, "{mode}");
        }
    }
}
