//! Geometry kernels and space transforms.
//!
//! [`math`] holds the point/segment/triangle/polygon primitives used by the
//! spatial index and the remappers; [`SpaceTransform`] maps destination
//! coordinates into source space.

pub mod math;
mod transform;

pub use transform::SpaceTransform;
pub(crate) use transform::{apply_normal_opt, apply_opt};
