//! Destination face remapping.

use std::collections::BTreeMap;

use nalgebra::{Point2, Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;
use crate::geometry::math::{area_poly_2d, area_tri_2d, axis_dominant_to_2d, sample_triangle_2d};
use crate::geometry::{apply_normal_opt, apply_opt};
use crate::mesh::{triangulate_polygon_2d, PolyMesh};
use crate::spatial::SpatialQuery;

use super::map::ItemSources;
use super::progress::Progress;
use super::{
    begin, define_topology, resolve_batched, CorrespondenceMap, ElementKind, RemapMode,
    RemapOptions, RemapStatus,
};

/// Bounds on the side of the ray grid cast from one face.
const FACE_RAYS_SIDE_MIN: usize = 4;
const FACE_RAYS_SIDE_MAX: usize = 20;

/// Smallest projected face area used when spreading rays over a face.
const MIN_FACE_AREA: f64 = 1e-9;

/// Compute the sources of every face of `dst`.
///
/// `map` is reset to one item per destination face.
///
/// [`FacePolyInterpNormalProjected`](RemapMode::FacePolyInterpNormalProjected)
/// draws its sample points from a single random stream seeded with 0, so it
/// always runs on the calling thread and repeated calls give identical maps.
///
/// # Errors
///
/// Invalid options, or [`Topology`](RemapMode::Topology) with differing
/// face counts.
pub fn remap_faces(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
) -> Result<RemapStatus> {
    remap_faces_internal(mode, src, dst, options, map, None)
}

/// Face remapping with progress reporting.
pub fn remap_faces_with_progress(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: &Progress,
) -> Result<RemapStatus> {
    remap_faces_internal(mode, src, dst, options, map, Some(progress))
}

fn remap_faces_internal(
    mode: RemapMode,
    src: &PolyMesh,
    dst: &PolyMesh,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
    progress: Option<&Progress>,
) -> Result<RemapStatus> {
    let n = dst.num_faces();
    if !begin(ElementKind::Face, mode, src.num_faces(), n, options, map)? {
        return Ok(RemapStatus::UnsupportedMode);
    }
    if mode == RemapMode::Topology {
        define_topology(map);
        return Ok(RemapStatus::Complete);
    }

    let message = "Remapping faces";
    let transform = options.transform();
    let tree = src.bvh_tris();
    let tri_faces = src.tri_faces();
    let centers = dst.face_centers();

    let items = match mode {
        RemapMode::FaceNearest => {
            let max_dist_sq = options.max_distance_sq();
            resolve_batched(
                n,
                options.parallel,
                progress,
                message,
                || SpatialQuery::new(tree),
                |query, f| {
                    let center = apply_opt(transform, &centers[f]);
                    match query.nearest(&center, max_dist_sq) {
                        Some(hit) => ItemSources::single(tri_faces[hit.index], 0),
                        None => ItemSources::invalid(),
                    }
                },
            )
        }
        RemapMode::FaceNormal => {
            let normals = dst.face_normals();
            resolve_batched(
                n,
                options.parallel,
                progress,
                message,
                || SpatialQuery::new(tree),
                |query, f| {
                    let center = apply_opt(transform, &centers[f]);
                    let no = apply_normal_opt(transform, &normals[f]);
                    match query.raycast(&center, &no, options.ray_radius, options.max_distance) {
                        Some(hit) => ItemSources::single(tri_faces[hit.index], 0),
                        None => ItemSources::invalid(),
                    }
                },
            )
        }
        RemapMode::FacePolyInterpNormalProjected => {
            // One random stream for the whole call: the state is created once
            // and the faces are visited in order.
            resolve_batched(
                n,
                false,
                progress,
                message,
                || FaceSampler::new(src, options),
                |sampler, f| sampler.sample(dst, f),
            )
        }
        _ => return Ok(RemapStatus::UnsupportedMode),
    };

    map.define_all(items);
    Ok(RemapStatus::Complete)
}

/// Side of the ray grid for a face whose projection spans `extent`.
fn face_ray_side(extent: f64, ray_radius: f64) -> usize {
    if ray_radius <= 0.0 {
        return FACE_RAYS_SIDE_MIN;
    }
    let side = (extent / ray_radius).round();
    if side.is_nan() {
        FACE_RAYS_SIDE_MIN
    } else {
        (side.min(FACE_RAYS_SIDE_MAX as f64) as usize).max(FACE_RAYS_SIDE_MIN)
    }
}

/// Casts rays from random points spread over destination faces.
struct FaceSampler<'a> {
    src: &'a PolyMesh,
    options: &'a RemapOptions,
    query: SpatialQuery<'a>,
    rng: StdRng,
    points: Vec<Point2<f64>>,
    weights: BTreeMap<usize, f64>,
}

impl<'a> FaceSampler<'a> {
    fn new(src: &'a PolyMesh, options: &'a RemapOptions) -> Self {
        Self {
            src,
            options,
            query: SpatialQuery::new(src.bvh_tris()),
            rng: StdRng::seed_from_u64(0),
            points: Vec::new(),
            weights: BTreeMap::new(),
        }
    }

    fn sample(&mut self, dst: &PolyMesh, f: usize) -> ItemSources {
        let transform = self.options.transform();
        let center = apply_opt(transform, &dst.face_centers()[f]);
        let no = apply_normal_opt(transform, &dst.face_normals()[f]);

        // Work in the plane of the face; the inverse rotation is the transpose.
        let to_2d = axis_dominant_to_2d(&no);
        let from_2d = to_2d.transpose();
        let height = (to_2d * center.coords).z;

        self.points.clear();
        self.points.extend(dst.face_verts(f).iter().map(|&v| {
            let q = to_2d * apply_opt(transform, dst.position(v)).coords;
            Point2::new(q.x, q.y)
        }));

        let (mut min, mut max) = (self.points[0], self.points[0]);
        for p in &self.points {
            min = min.inf(p);
            max = max.sup(p);
        }
        let side = face_ray_side((max.x - min.x).max(max.y - min.y), self.options.ray_radius);
        let total_rays = side * side;
        let area_inv = 1.0 / area_poly_2d(&self.points).max(MIN_FACE_AREA);

        self.weights.clear();
        let mut total = 0.0;
        let mut done_area = 0.0;
        let mut done_rays = 0usize;
        let tri_faces = self.src.tri_faces();

        for [a, b, c] in triangulate_polygon_2d(&self.points) {
            let (pa, pb, pc) = (self.points[a], self.points[b], self.points[c]);

            // Rays handed out so far follow the cumulative area, so rounding
            // never drifts across triangles.
            done_area += area_tri_2d(&pa, &pb, &pc);
            let target = (total_rays as f64 * done_area * area_inv).round() as usize;
            let rays = target.saturating_sub(done_rays);
            done_rays += rays;

            for _ in 0..rays {
                let s = sample_triangle_2d(&mut self.rng, &pa, &pb, &pc);
                let co = Point3::from(from_2d * Vector3::new(s.x, s.y, height));
                for (radius, w) in self.options.ray_attempts() {
                    if let Some(hit) =
                        self.query
                            .raycast(&co, &no, radius, self.options.max_distance)
                    {
                        *self.weights.entry(tri_faces[hit.index]).or_insert(0.0) += w;
                        total += w;
                        break;
                    }
                }
            }
        }

        if total > 0.0 {
            let (indices, weights): (Vec<usize>, Vec<f64>) =
                self.weights.iter().map(|(&i, &w)| (i, w / total)).unzip();
            ItemSources::weighted(&indices, &weights, 0)
        } else {
            ItemSources::invalid()
        }
    }
}
