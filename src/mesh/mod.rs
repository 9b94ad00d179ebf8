//! Core mesh data structures.
//!
//! This module provides the polygon mesh representation consumed by the
//! remappers.
//!
//! # Overview
//!
//! The primary type is [`PolyMesh`]: vertex positions, an edge list and
//! n-gon faces stored as contiguous runs of corners. Derived data (normals,
//! the corner triangulation, adjacency maps and BVH trees) is computed lazily
//! and cached inside the mesh, so the same mesh can serve many remap calls.
//!
//! Adjacency is exposed as [`GroupedMap`] values, flat index arrays split
//! into one group per element.
//!
//! # Construction
//!
//! Meshes are typically constructed from file I/O or from face-vertex lists:
//!
//! ```
//! use meshpair::mesh::{build_from_triangles, PolyMesh};
//! use nalgebra::Point3;
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: PolyMesh = build_from_triangles(positions, &faces).unwrap();
//! assert_eq!(mesh.num_edges(), 3);
//! ```

mod adjacency;
mod builder;
mod poly;
mod triangulate;

pub use adjacency::GroupedMap;
pub use builder::{build_from_edges, build_from_polygons, build_from_quads, build_from_triangles};
pub use poly::PolyMesh;
pub use triangulate::{triangulate_polygon_2d, triangulate_polygon_3d};

/// Small meshes shared by the unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::PolyMesh;
    use nalgebra::Point3;

    /// Unit cube spanning `[0, 1]³`: 8 vertices, 12 edges, 6 outward quads.
    pub fn cube() -> PolyMesh {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = [
            [0, 3, 2, 1], // -z
            [4, 5, 6, 7], // +z
            [0, 1, 5, 4], // -y
            [2, 3, 7, 6], // +y
            [0, 4, 7, 3], // -x
            [1, 2, 6, 5], // +x
        ];
        PolyMesh::from_quads(positions, &faces).unwrap()
    }

    /// `nx` by `ny` unit quads in the XY plane, facing +Z.
    ///
    /// Vertex `(i, j)` has index `j * (nx + 1) + i`; face `(i, j)` has index
    /// `j * nx + i`.
    pub fn grid(nx: usize, ny: usize) -> PolyMesh {
        grid_at(nx, ny, 0.0)
    }

    /// [`grid`] lifted to height `z`.
    pub fn grid_at(nx: usize, ny: usize, z: f64) -> PolyMesh {
        let mut positions = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                positions.push(Point3::new(i as f64, j as f64, z));
            }
        }
        let row = nx + 1;
        let mut faces = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let v = j * row + i;
                faces.push([v, v + 1, v + row + 1, v + row]);
            }
        }
        PolyMesh::from_quads(positions, &faces).unwrap()
    }

    /// A row of `n` unit quads along X whose middle edge (between quad
    /// `n / 2 - 1` and `n / 2`) is a seam.
    pub fn seam_strip(n: usize) -> PolyMesh {
        let mut mesh = grid(n, 1);
        let cut = n / 2;
        assert!(mesh.mark_seam(cut, cut + n + 1));
        mesh
    }
}
