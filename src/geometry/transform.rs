//! Rigid/affine transforms between the destination and source mesh spaces.

use nalgebra::{Matrix4, Point3, Vector3};

/// A pair of mutually inverse affine transforms.
///
/// `apply` moves destination-space coordinates into source space before any
/// spatial query is issued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTransform {
    local_to_target: Matrix4<f64>,
    target_to_local: Matrix4<f64>,
}

impl Default for SpaceTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpaceTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            local_to_target: Matrix4::identity(),
            target_to_local: Matrix4::identity(),
        }
    }

    /// Build from an explicit local-to-target matrix.
    ///
    /// A singular matrix gets an identity inverse.
    pub fn from_matrix(local_to_target: Matrix4<f64>) -> Self {
        let target_to_local = local_to_target
            .try_inverse()
            .unwrap_or_else(Matrix4::identity);
        Self {
            local_to_target,
            target_to_local,
        }
    }

    /// Transform between two objects given their world matrices.
    ///
    /// Points of the `local` object are expressed in the space of `target`:
    /// `target⁻¹ · local`.
    pub fn from_matrices(local: &Matrix4<f64>, target: &Matrix4<f64>) -> Self {
        let target_inv = target.try_inverse().unwrap_or_else(Matrix4::identity);
        Self::from_matrix(target_inv * local)
    }

    /// Transform mapping the frame `local` onto the frame `target`:
    /// `target · local⁻¹`.
    pub fn global_from_matrices(local: &Matrix4<f64>, target: &Matrix4<f64>) -> Self {
        let local_inv = local.try_inverse().unwrap_or_else(Matrix4::identity);
        Self::from_matrix(target * local_inv)
    }

    /// The local-to-target matrix.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.local_to_target
    }

    /// The target-to-local matrix.
    #[inline]
    pub fn inverse_matrix(&self) -> &Matrix4<f64> {
        &self.target_to_local
    }

    /// Map a point from local to target space.
    #[inline]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.local_to_target.transform_point(p)
    }

    /// Map a point from target back to local space.
    #[inline]
    pub fn invert_apply(&self, p: &Point3<f64>) -> Point3<f64> {
        self.target_to_local.transform_point(p)
    }

    /// Map a direction through the linear part and renormalize it.
    ///
    /// Zero-length results stay zero.
    #[inline]
    pub fn apply_normal(&self, n: &Vector3<f64>) -> Vector3<f64> {
        let v = self.local_to_target.transform_vector(n);
        v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
    }
}

/// Apply an optional transform to a point.
#[inline]
pub(crate) fn apply_opt(transform: Option<&SpaceTransform>, p: &Point3<f64>) -> Point3<f64> {
    match transform {
        Some(t) => t.apply(p),
        None => *p,
    }
}

/// Apply an optional transform to a normal.
#[inline]
pub(crate) fn apply_normal_opt(transform: Option<&SpaceTransform>, n: &Vector3<f64>) -> Vector3<f64> {
    match transform {
        Some(t) => t.apply_normal(n),
        None => *n,
    }
}
