//! Spatial indexing for source meshes.
//!
//! [`Bvh`] answers nearest-primitive and ray queries over points, segments
//! and triangles; [`SpatialQuery`] wraps a tree with the small amount of
//! state that lets consecutive nearest queries reuse the previous hit.
//!
//! # Example
//!
//! ```
//! use meshpair::spatial::{Bvh, SpatialQuery};
//! use nalgebra::Point3;
//!
//! let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
//! let tree = Bvh::from_points(&points, 0..points.len());
//! let mut query = SpatialQuery::new(&tree);
//!
//! let hit = query.nearest(&Point3::new(1.5, 0.0, 0.0), f64::INFINITY).unwrap();
//! assert_eq!(hit.index, 1);
//! ```

mod bvh;
mod query;

pub use bvh::{Bvh, BvhPrimitive, NearestHit, RayHit};
pub use query::SpatialQuery;
