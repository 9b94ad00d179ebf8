//! Read-only polygon mesh with lazily derived data.
//!
//! Topology is stored as flat arrays: faces are ranges of corners given by
//! `face_offsets`, each corner references one vertex and the edge leading to
//! the next corner. Everything else (normals, triangulation, adjacency, BVH
//! trees) is computed on first use and cached. The caches are `OnceLock`s, so
//! a shared `&PolyMesh` can be queried from several rayon workers at once.

use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

use nalgebra::{Point3, Vector3};

use super::adjacency::GroupedMap;
use super::builder;
use super::triangulate::triangulate_polygon_3d;
use crate::error::{MeshError, Result};
use crate::geometry::math::{angle_between, centroid, closest_on_triangle, newell_normal};
use crate::spatial::{Bvh, BvhPrimitive};

#[derive(Debug, Clone, Default)]
struct Triangulation {
    tris: Vec<[usize; 3]>,
    tri_faces: Vec<usize>,
    face_offsets: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
struct DerivedCache {
    face_normals: OnceLock<Vec<Vector3<f64>>>,
    vert_normals: OnceLock<Vec<Vector3<f64>>>,
    corner_normals: OnceLock<Vec<Vector3<f64>>>,
    face_centers: OnceLock<Vec<Point3<f64>>>,
    triangulation: OnceLock<Triangulation>,
    corner_faces: OnceLock<Vec<usize>>,
    vert_to_edges: OnceLock<GroupedMap>,
    vert_to_corners: OnceLock<GroupedMap>,
    vert_to_faces: OnceLock<GroupedMap>,
    edge_to_faces: OnceLock<GroupedMap>,
    bvh_verts: OnceLock<Bvh>,
    bvh_edges: OnceLock<Bvh>,
    bvh_tris: OnceLock<Bvh>,
}

/// A polygon mesh: vertices, edges, and n-gon faces made of corners.
///
/// Corner `c` of face `f` (with `c` in [`face_corners(f)`](Self::face_corners))
/// sits on vertex `corner_verts()[c]`; `corner_edges()[c]` is the edge from
/// that vertex to the next corner's vertex.
///
/// # Example
///
/// ```
/// use meshpair::mesh::PolyMesh;
/// use nalgebra::Point3;
///
/// let positions = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let mesh = PolyMesh::from_polygons(positions, &[vec![0, 1, 2, 3]]).unwrap();
///
/// assert_eq!(mesh.num_edges(), 4);
/// assert_eq!(mesh.num_corners(), 4);
/// assert_eq!(mesh.corner_tris().len(), 2);
/// ```
#[derive(Clone)]
pub struct PolyMesh {
    positions: Vec<Point3<f64>>,
    edges: Vec<[usize; 2]>,
    face_offsets: Vec<usize>,
    corner_verts: Vec<usize>,
    corner_edges: Vec<usize>,
    seams: Vec<bool>,
    sharp_faces: Vec<bool>,
    cache: DerivedCache,
}

impl fmt::Debug for PolyMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyMesh")
            .field("vertices", &self.num_vertices())
            .field("edges", &self.num_edges())
            .field("faces", &self.num_faces())
            .field("corners", &self.num_corners())
            .finish()
    }
}

impl PolyMesh {
    /// Assemble a mesh from already consistent arrays.
    pub(crate) fn from_parts(
        positions: Vec<Point3<f64>>,
        edges: Vec<[usize; 2]>,
        face_offsets: Vec<usize>,
        corner_verts: Vec<usize>,
        corner_edges: Vec<usize>,
    ) -> Self {
        let num_edges = edges.len();
        let num_faces = face_offsets.len().saturating_sub(1);
        Self {
            positions,
            edges,
            face_offsets,
            corner_verts,
            corner_edges,
            seams: vec![false; num_edges],
            sharp_faces: vec![false; num_faces],
            cache: DerivedCache::default(),
        }
    }

    /// A vertex-only mesh (point cloud).
    pub fn from_points(positions: Vec<Point3<f64>>) -> Self {
        Self::from_parts(positions, Vec::new(), vec![0], Vec::new(), Vec::new())
    }

    /// Build from n-gon faces given as vertex index lists.
    ///
    /// See [`build_from_polygons`](super::build_from_polygons).
    pub fn from_polygons(positions: Vec<Point3<f64>>, faces: &[Vec<usize>]) -> Result<Self> {
        builder::build_from_polygons(positions, faces)
    }

    /// Build from triangles.
    pub fn from_triangles(positions: Vec<Point3<f64>>, faces: &[[usize; 3]]) -> Result<Self> {
        builder::build_from_triangles(positions, faces)
    }

    /// Build from quads.
    pub fn from_quads(positions: Vec<Point3<f64>>, faces: &[[usize; 4]]) -> Result<Self> {
        builder::build_from_quads(positions, faces)
    }

    /// Build a wire mesh from loose edges.
    pub fn from_edges(positions: Vec<Point3<f64>>, edges: &[[usize; 2]]) -> Result<Self> {
        builder::build_from_edges(positions, edges)
    }

    /// Replace the per-edge seam flags.
    pub fn with_seams(mut self, seams: Vec<bool>) -> Result<Self> {
        if seams.len() != self.edges.len() {
            return Err(MeshError::InvalidAttributeLength {
                name: "seams",
                expected: self.edges.len(),
                found: seams.len(),
            });
        }
        self.seams = seams;
        Ok(self)
    }

    /// Replace the per-face sharp flags.
    pub fn with_sharp_faces(mut self, sharp_faces: Vec<bool>) -> Result<Self> {
        if sharp_faces.len() != self.num_faces() {
            return Err(MeshError::InvalidAttributeLength {
                name: "sharp_faces",
                expected: self.num_faces(),
                found: sharp_faces.len(),
            });
        }
        self.sharp_faces = sharp_faces;
        self.cache.corner_normals = OnceLock::new();
        Ok(self)
    }

    /// Flag the edge between `v0` and `v1` as a seam.
    ///
    /// Returns `false` if no such edge exists.
    pub fn mark_seam(&mut self, v0: usize, v1: usize) -> bool {
        match self.find_edge(v0, v1) {
            Some(e) => {
                self.seams[e] = true;
                true
            }
            None => false,
        }
    }

    // ==================== Counts ====================

    /// Number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Number of edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.face_offsets.len() - 1
    }

    /// Number of face corners.
    #[inline]
    pub fn num_corners(&self) -> usize {
        self.corner_verts.len()
    }

    // ==================== Stored data ====================

    /// Vertex positions.
    #[inline]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Position of vertex `v`.
    #[inline]
    pub fn position(&self, v: usize) -> &Point3<f64> {
        &self.positions[v]
    }

    /// Edge vertex pairs.
    #[inline]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Vertex pair of edge `e`.
    #[inline]
    pub fn edge(&self, e: usize) -> [usize; 2] {
        self.edges[e]
    }

    /// Midpoint of edge `e`.
    pub fn edge_midpoint(&self, e: usize) -> Point3<f64> {
        let [a, b] = self.edges[e];
        nalgebra::center(&self.positions[a], &self.positions[b])
    }

    /// Face offsets into the corner arrays (`num_faces() + 1` entries).
    #[inline]
    pub fn face_offsets(&self) -> &[usize] {
        &self.face_offsets
    }

    /// Corner range of face `f`.
    #[inline]
    pub fn face_corners(&self, f: usize) -> Range<usize> {
        self.face_offsets[f]..self.face_offsets[f + 1]
    }

    /// Number of corners of face `f`.
    #[inline]
    pub fn face_size(&self, f: usize) -> usize {
        self.face_offsets[f + 1] - self.face_offsets[f]
    }

    /// Vertices of face `f`, in corner order.
    #[inline]
    pub fn face_verts(&self, f: usize) -> &[usize] {
        &self.corner_verts[self.face_corners(f)]
    }

    /// Edges of face `f`, in corner order.
    #[inline]
    pub fn face_edges(&self, f: usize) -> &[usize] {
        &self.corner_edges[self.face_corners(f)]
    }

    /// Vertex of every corner.
    #[inline]
    pub fn corner_verts(&self) -> &[usize] {
        &self.corner_verts
    }

    /// Outgoing edge of every corner.
    #[inline]
    pub fn corner_edges(&self) -> &[usize] {
        &self.corner_edges
    }

    /// Per-edge seam flags.
    #[inline]
    pub fn seams(&self) -> &[bool] {
        &self.seams
    }

    /// Per-face sharp flags.
    #[inline]
    pub fn sharp_faces(&self) -> &[bool] {
        &self.sharp_faces
    }

    /// Find the edge joining `v0` and `v1` in either direction.
    pub fn find_edge(&self, v0: usize, v1: usize) -> Option<usize> {
        if v0 >= self.num_vertices() {
            return None;
        }
        self.vert_to_edges()
            .get(v0)
            .iter()
            .copied()
            .find(|&e| {
                let [a, b] = self.edges[e];
                (a == v0 && b == v1) || (a == v1 && b == v0)
            })
    }

    /// Axis-aligned bounds of the vertex positions.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p))),
        )
    }

    // ==================== Derived: geometry ====================

    /// Unit face normals (Newell's method, zero for degenerate faces).
    pub fn face_normals(&self) -> &[Vector3<f64>] {
        self.cache.face_normals.get_or_init(|| {
            (0..self.num_faces())
                .map(|f| newell_normal(self.face_verts(f).iter().map(|&v| self.positions[v])))
                .collect()
        })
    }

    /// Unit vertex normals, corner-angle weighted.
    ///
    /// Vertices without faces use their normalized position.
    pub fn vert_normals(&self) -> &[Vector3<f64>] {
        self.cache.vert_normals.get_or_init(|| {
            let face_normals = self.face_normals();
            let mut acc = vec![Vector3::zeros(); self.num_vertices()];
            for f in 0..self.num_faces() {
                let verts = self.face_verts(f);
                let n = verts.len();
                for i in 0..n {
                    let v = verts[i];
                    let p = self.positions[v];
                    let prev = self.positions[verts[(i + n - 1) % n]];
                    let next = self.positions[verts[(i + 1) % n]];
                    acc[v] += face_normals[f] * angle_between(&(prev - p), &(next - p));
                }
            }
            acc.into_iter()
                .zip(&self.positions)
                .map(|(n, p)| {
                    n.try_normalize(0.0)
                        .or_else(|| p.coords.try_normalize(0.0))
                        .unwrap_or_else(Vector3::zeros)
                })
                .collect()
        })
    }

    /// Per-corner normals: the face normal on sharp faces, the vertex normal
    /// otherwise.
    pub fn corner_normals(&self) -> &[Vector3<f64>] {
        self.cache.corner_normals.get_or_init(|| {
            let face_normals = self.face_normals();
            let vert_normals = self.vert_normals();
            let mut normals = Vec::with_capacity(self.num_corners());
            for f in 0..self.num_faces() {
                for c in self.face_corners(f) {
                    normals.push(if self.sharp_faces[f] {
                        face_normals[f]
                    } else {
                        vert_normals[self.corner_verts[c]]
                    });
                }
            }
            normals
        })
    }

    /// Face centers (mean of the corner positions).
    pub fn face_centers(&self) -> &[Point3<f64>] {
        self.cache.face_centers.get_or_init(|| {
            (0..self.num_faces())
                .map(|f| centroid(self.face_verts(f).iter().map(|&v| self.positions[v])))
                .collect()
        })
    }

    // ==================== Derived: triangulation ====================

    fn triangulation(&self) -> &Triangulation {
        self.cache.triangulation.get_or_init(|| {
            let face_normals = self.face_normals();
            let mut tri = Triangulation {
                tris: Vec::with_capacity(self.num_corners().saturating_sub(2 * self.num_faces())),
                tri_faces: Vec::new(),
                face_offsets: Vec::with_capacity(self.num_faces() + 1),
            };
            tri.face_offsets.push(0);
            let mut points = Vec::new();
            for f in 0..self.num_faces() {
                let corners = self.face_corners(f);
                let first = corners.start;
                if corners.len() == 3 {
                    tri.tris.push([first, first + 1, first + 2]);
                } else {
                    points.clear();
                    points.extend(self.face_verts(f).iter().map(|&v| self.positions[v]));
                    for [a, b, c] in triangulate_polygon_3d(&points, &face_normals[f]) {
                        tri.tris.push([first + a, first + b, first + c]);
                    }
                }
                tri.tri_faces.resize(tri.tris.len(), f);
                tri.face_offsets.push(tri.tris.len());
            }
            tri
        })
    }

    /// Triangles of the corner triangulation, as corner index triples.
    pub fn corner_tris(&self) -> &[[usize; 3]] {
        &self.triangulation().tris
    }

    /// Face owning each triangle of [`corner_tris`](Self::corner_tris).
    pub fn tri_faces(&self) -> &[usize] {
        &self.triangulation().tri_faces
    }

    /// Range of triangles belonging to face `f`.
    pub fn face_tris(&self, f: usize) -> Range<usize> {
        let offsets = &self.triangulation().face_offsets;
        offsets[f]..offsets[f + 1]
    }

    /// Vertex positions of triangle `t`.
    pub fn tri_positions(&self, t: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.corner_tris()[t];
        [
            self.positions[self.corner_verts[a]],
            self.positions[self.corner_verts[b]],
            self.positions[self.corner_verts[c]],
        ]
    }

    /// Closest point to `p` on face `f`.
    pub fn closest_point_on_face(&self, f: usize, p: &Point3<f64>) -> Point3<f64> {
        self.face_tris(f)
            .map(|t| {
                let [a, b, c] = self.tri_positions(t);
                closest_on_triangle(p, &a, &b, &c)
            })
            .min_by(|x, y| (p - x).norm_squared().total_cmp(&(p - y).norm_squared()))
            .unwrap_or_else(|| self.face_centers()[f])
    }

    // ==================== Derived: adjacency ====================

    /// Face of every corner.
    pub fn corner_faces(&self) -> &[usize] {
        self.cache.corner_faces.get_or_init(|| {
            let mut faces = Vec::with_capacity(self.num_corners());
            for f in 0..self.num_faces() {
                faces.resize(self.face_offsets[f + 1], f);
            }
            faces
        })
    }

    /// Edges around each vertex.
    pub fn vert_to_edges(&self) -> &GroupedMap {
        self.cache.vert_to_edges.get_or_init(|| {
            let pairs = self
                .edges
                .iter()
                .enumerate()
                .flat_map(|(e, &[a, b])| [(a, e), (b, e)]);
            GroupedMap::from_pairs(self.num_vertices(), pairs)
        })
    }

    /// Corners on each vertex.
    pub fn vert_to_corners(&self) -> &GroupedMap {
        self.cache.vert_to_corners.get_or_init(|| {
            GroupedMap::from_pairs(
                self.num_vertices(),
                self.corner_verts.iter().enumerate().map(|(c, &v)| (v, c)),
            )
        })
    }

    /// Faces around each vertex.
    pub fn vert_to_faces(&self) -> &GroupedMap {
        self.cache.vert_to_faces.get_or_init(|| {
            let corner_faces = self.corner_faces();
            GroupedMap::from_pairs(
                self.num_vertices(),
                self.corner_verts
                    .iter()
                    .zip(corner_faces)
                    .map(|(&v, &f)| (v, f)),
            )
        })
    }

    /// Faces using each edge.
    pub fn edge_to_faces(&self) -> &GroupedMap {
        self.cache.edge_to_faces.get_or_init(|| {
            let corner_faces = self.corner_faces();
            GroupedMap::from_pairs(
                self.num_edges(),
                self.corner_edges
                    .iter()
                    .zip(corner_faces)
                    .map(|(&e, &f)| (e, f)),
            )
        })
    }

    // ==================== Derived: spatial trees ====================

    /// Tree over all vertices.
    pub fn bvh_verts(&self) -> &Bvh {
        self.cache
            .bvh_verts
            .get_or_init(|| Bvh::from_points(&self.positions, 0..self.num_vertices()))
    }

    /// Tree over all edges.
    pub fn bvh_edges(&self) -> &Bvh {
        self.cache
            .bvh_edges
            .get_or_init(|| self.build_edge_bvh(0..self.num_edges()))
    }

    /// Tree over all corner triangles, reporting triangle indices.
    pub fn bvh_tris(&self) -> &Bvh {
        self.cache
            .bvh_tris
            .get_or_init(|| self.build_tri_bvh(0..self.corner_tris().len()))
    }

    /// Tree over a subset of edges.
    pub fn build_edge_bvh<I: IntoIterator<Item = usize>>(&self, edges: I) -> Bvh {
        Bvh::build(edges.into_iter().map(|e| {
            let [a, b] = self.edges[e];
            (e, BvhPrimitive::Segment(self.positions[a], self.positions[b]))
        }))
    }

    /// Tree over a subset of corner triangles.
    pub fn build_tri_bvh<I: IntoIterator<Item = usize>>(&self, tris: I) -> Bvh {
        Bvh::build(tris.into_iter().map(|t| {
            let [a, b, c] = self.tri_positions(t);
            (t, BvhPrimitive::Triangle(a, b, c))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_counts_and_caches() {
        let cube = fixtures::cube();
        assert_eq!(cube.num_vertices(), 8);
        assert_eq!(cube.num_edges(), 12);
        assert_eq!(cube.num_faces(), 6);
        assert_eq!(cube.num_corners(), 24);
        assert_eq!(cube.corner_tris().len(), 12);

        for f in 0..6 {
            assert_eq!(cube.face_tris(f).len(), 2);
            for t in cube.face_tris(f) {
                assert_eq!(cube.tri_faces()[t], f);
            }
            // Outward normals: the center of the cube is behind every face.
            let n = cube.face_normals()[f];
            let c = cube.face_centers()[f];
            assert!(n.dot(&(Point3::new(0.5, 0.5, 0.5) - c)) < 0.0);
        }
    }

    #[test]
    fn test_cube_vertex_normals_point_outwards() {
        let cube = fixtures::cube();
        let expected = 1.0 / 3.0f64.sqrt();
        for (v, n) in cube.vert_normals().iter().enumerate() {
            let dir = cube.position(v) - Point3::new(0.5, 0.5, 0.5);
            assert_relative_eq!(n.dot(&dir.normalize()), 1.0, epsilon = 1e-12);
            assert_relative_eq!(n.x.abs(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_adjacency_maps() {
        let cube = fixtures::cube();
        for v in 0..8 {
            assert_eq!(cube.vert_to_edges().get(v).len(), 3);
            assert_eq!(cube.vert_to_faces().get(v).len(), 3);
            assert_eq!(cube.vert_to_corners().get(v).len(), 3);
        }
        for e in 0..12 {
            assert_eq!(cube.edge_to_faces().get(e).len(), 2);
        }
        for (c, &f) in cube.corner_faces().iter().enumerate() {
            assert!(cube.face_corners(f).contains(&c));
        }
    }

    #[test]
    fn test_corner_normals_follow_sharp_flags() {
        let grid = fixtures::grid(2, 2).with_sharp_faces(vec![true, false, false, false]);
        let grid = grid.unwrap();
        for c in grid.face_corners(0) {
            assert_relative_eq!(grid.corner_normals()[c], Vector3::z(), epsilon = 1e-12);
        }
        assert!(fixtures::grid(2, 2).with_sharp_faces(vec![true]).is_err());
    }

    #[test]
    fn test_mark_seam_and_find_edge() {
        let mut grid = fixtures::grid(2, 1);
        assert!(grid.mark_seam(4, 1));
        let e = grid.find_edge(1, 4).unwrap();
        assert!(grid.seams()[e]);
        assert!(!grid.mark_seam(0, 5));
        assert_eq!(grid.seams().iter().filter(|&&s| s).count(), 1);

        let n = grid.num_edges();
        let mut seams = vec![false; n];
        seams[0] = true;
        let grid = grid.with_seams(seams).unwrap();
        assert!(grid.seams()[0] && !grid.seams()[e]);
        assert!(grid.with_seams(vec![true; n + 1]).is_err());
    }

    #[test]
    fn test_ngon_triangulation_and_closest_point() {
        let positions: Vec<Point3<f64>> = (0..6)
            .map(|i| {
                let a = i as f64 * std::f64::consts::TAU / 6.0;
                Point3::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let mesh = PolyMesh::from_polygons(positions, &[vec![0, 1, 2, 3, 4, 5]]).unwrap();
        assert_eq!(mesh.face_size(0), 6);
        assert_eq!(mesh.corner_tris().len(), 4);
        let p = mesh.closest_point_on_face(0, &Point3::new(0.1, 0.2, 3.0));
        assert_relative_eq!(p, Point3::new(0.1, 0.2, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_point_cloud() {
        let mesh = PolyMesh::from_points(vec![Point3::new(0.0, 0.0, 2.0), Point3::origin()]);
        assert_eq!(mesh.num_faces(), 0);
        assert_eq!(mesh.num_corners(), 0);
        assert_eq!(mesh.vert_normals()[0], Vector3::z());
        assert_eq!(mesh.vert_normals()[1], Vector3::zeros());
        assert!(mesh.corner_tris().is_empty());
    }
}
