//! # meshpair
//!
//! Mesh-to-mesh element correspondence for attribute transfer.
//!
//! Given a source mesh and a destination mesh, meshpair computes for every
//! destination vertex, edge, face corner or face the source elements it
//! corresponds to, each with an interpolation weight. Applying the weights
//! to any per-element source attribute (colors, UVs, weights, normals) is
//! left to the caller.
//!
//! ## Features
//!
//! - **Polygon meshes**: n-gon faces, loose edges and point clouds, with
//!   lazily cached normals, triangulation, adjacency and BVH trees
//! - **Many strategies**: nearest element, nearest face interpolation and
//!   normal projection for each element kind
//! - **Island aware corners**: UV seam islands are never blended within one
//!   face, with an optional A* correction across inner cuts
//! - **Auto alignment**: best rigid or mirrored fit of two shapes
//! - **Parallel**: rayon-backed, with identical results in sequential mode
//! - **File formats**: STL and PLY loading
//!
//! ## Quick Start
//!
//! ```no_run
//! use meshpair::prelude::*;
//!
//! let source = meshpair::io::load("scan.ply").unwrap();
//! let target = meshpair::io::load("retopo.ply").unwrap();
//!
//! let mut map = CorrespondenceMap::default();
//! remap_corners(
//!     RemapMode::CornerPolyInterpNearest,
//!     &source,
//!     &target,
//!     Some(&SeamIslands),
//!     &RemapOptions::default().with_islands_precision(0.5),
//!     &mut map,
//! )
//! .unwrap();
//! println!("{} of {} corners mapped", map.valid_count(), map.len());
//! ```
//!
//! ## Transferring an Attribute
//!
//! ```
//! use meshpair::prelude::*;
//! use nalgebra::Point3;
//!
//! let source = PolyMesh::from_edges(
//!     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
//!     &[[0, 1]],
//! )
//! .unwrap();
//! let target = PolyMesh::from_points(vec![Point3::new(0.5, 0.3, 0.0)]);
//!
//! let mut map = CorrespondenceMap::default();
//! remap_verts(
//!     RemapMode::VertEdgeInterpNearest,
//!     &source,
//!     &target,
//!     &RemapOptions::default(),
//!     &mut map,
//! )
//! .unwrap();
//!
//! // A scalar per source vertex, sampled at the target vertex.
//! let temperature = [10.0, 30.0];
//! let value = map.item(0).interpolate(|v| temperature[v]).unwrap();
//! assert!((value - 15.0).abs() < 1e-9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod geometry;
pub mod io;
pub mod mesh;
pub mod remap;
pub mod spatial;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use meshpair::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{MeshError, Result};
    pub use crate::geometry::SpaceTransform;
    pub use crate::mesh::{build_from_polygons, build_from_triangles, PolyMesh};
    pub use crate::remap::{
        remap_corners, remap_corners_with_progress, remap_edges, remap_edges_with_progress,
        remap_faces, remap_faces_with_progress, remap_verts, remap_verts_with_progress,
        CorrespondenceItem, CorrespondenceMap, Diagnostics, IslandClassifier, Progress,
        RemapMode, RemapOptions, RemapStatus, SeamIslands,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    /// Every destination vertex of a cube maps onto itself, in every
    /// nearest-based vertex mode.
    #[test]
    fn test_cube_vertices_onto_themselves() {
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
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![2, 3, 7, 6],
            vec![0, 4, 7, 3],
            vec![1, 2, 6, 5],
        ];
        let cube = build_from_polygons(positions, &faces).unwrap();

        let mut map = CorrespondenceMap::default();
        for mode in [
            RemapMode::Topology,
            RemapMode::VertNearest,
            RemapMode::VertEdgeNearest,
            RemapMode::VertFaceNearest,
        ] {
            let status = remap_verts(mode, &cube, &cube, &RemapOptions::default(), &mut map).unwrap();
            assert_eq!(status, RemapStatus::Complete);
            for v in 0..cube.num_vertices() {
                assert_eq!(map.item(v).sources, &[v], "{mode}");
            }
        }
    }
}
