//! Automatic alignment of a destination point set onto a source mesh.
//!
//! Both shapes are summarized by their covariance ellipsoid: a matrix whose
//! columns are the principal axes scaled by the square root of their
//! variance, translated to the centroid. Mapping one ellipsoid onto the
//! other leaves an ambiguity on the sign of every axis, so eight mirror
//! combinations are scored and the closest fit is kept.

use nalgebra::{Matrix3, Matrix4, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;

use crate::geometry::math::ortho_basis;
use crate::geometry::{apply_opt, SpaceTransform};
use crate::mesh::PolyMesh;
use crate::spatial::SpatialQuery;

/// Eigenvalues closer than this (absolute) are considered equal.
const EIGEN_EQUAL_EPS: f32 = f32::EPSILON;
/// Single precision ulps two eigenvalues may differ by and still be equal.
const EIGEN_EQUAL_ULPS: i32 = 64;

/// Eigenvalues below this magnitude are replaced by [`EIGEN_FLOOR`].
const EIGEN_MIN: f64 = 1e-6;
const EIGEN_FLOOR: f64 = 1e-3;

/// Contribution of a point without any source vertex.
const NO_MATCH_CONTRIBUTION: f64 = 1e-18;

/// Axis negations applied one after the other to the destination axes.
///
/// Applied cumulatively they visit every sign combination other than the
/// starting one: `-++`, `--+`, `---`, `-+-`, `++-`, `+--`, `+-+`.
const MIRRORS: [[f64; 3]; 7] = [
    [-1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, 1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, -1.0],
];

/// Result of [`find_best_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentResult {
    /// Transform taking destination points into source space.
    pub transform: SpaceTransform,
    /// [`difference`] score of `transform` (lower is better).
    pub score: f64,
    /// Score of every candidate, unmirrored first.
    pub candidate_scores: [f64; 8],
}

/// Relative float comparison in single precision.
fn nearly_equal(a: f64, b: f64) -> bool {
    let (a, b) = (a as f32, b as f32);
    if (a - b).abs() <= EIGEN_EQUAL_EPS {
        return true;
    }
    if (a < 0.0) != (b < 0.0) {
        return false;
    }
    (a.to_bits() as i32).wrapping_sub(b.to_bits() as i32).abs() <= EIGEN_EQUAL_ULPS
}

/// Covariance ellipsoid of `points` as an affine matrix.
///
/// Columns 0 to 2 are the principal axes (ascending variance) scaled by the
/// signed square root of their eigenvalue; column 3 is the centroid. When
/// two eigenvalues coincide only the remaining axis is meaningful and the
/// other two are rebuilt around it; when all three coincide the axes are the
/// coordinate axes.
///
/// Fewer than two points give the identity, translated to the point if
/// there is one.
///
/// # Example
///
/// ```
/// use meshpair::remap::eigen_matrix;
/// use nalgebra::Point3;
///
/// // Points spread along X only.
/// let points: Vec<_> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
/// let m = eigen_matrix(&points);
/// assert_eq!(m[(0, 3)], 2.0);
/// // The widest axis comes last.
/// assert!(m.fixed_view::<3, 1>(0, 2).norm() > 1.0);
/// ```
pub fn eigen_matrix(points: &[Point3<f64>]) -> Matrix4<f64> {
    let n = points.len();
    let mut result = Matrix4::identity();
    if n == 0 {
        return result;
    }

    let center = Point3::from(points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n as f64);
    result.fixed_view_mut::<3, 1>(0, 3).copy_from(&center.coords);
    if n < 2 {
        return result;
    }

    // Sample covariance: the vertices are a sample of the surface.
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p - center;
        cov += d * d.transpose();
    }
    cov /= (n - 1) as f64;

    let eigen = SymmetricEigen::new(cov);
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let values = order.map(|i| eigen.eigenvalues[i]);
    let mut axes = order.map(|i| eigen.eigenvectors.column(i).into_owned());

    if nearly_equal(values[0], values[1]) {
        if nearly_equal(values[0], values[2]) {
            axes = [Vector3::x(), Vector3::y(), Vector3::z()];
        } else {
            (axes[0], axes[1]) = ortho_basis(&axes[2]);
        }
    } else if nearly_equal(values[0], values[2]) {
        (axes[2], axes[0]) = ortho_basis(&axes[1]);
    } else if nearly_equal(values[1], values[2]) {
        (axes[1], axes[2]) = ortho_basis(&axes[0]);
    }

    for (i, (axis, value)) in axes.iter().zip(values).enumerate() {
        let scale = if value.abs() < EIGEN_MIN {
            EIGEN_FLOOR.copysign(value)
        } else {
            value.abs().sqrt().copysign(value)
        };
        result.fixed_view_mut::<3, 1>(0, i).copy_from(&(axis * scale));
    }
    result
}

/// How far `dst_points`, moved by `transform`, lie from the vertices of
/// `src` (lower is better, 0 for a perfect overlap).
///
/// Every point contributes `1 / (d + 1)` for the distance `d` to its
/// nearest source vertex; the score is `count / total - 1`. A few far
/// outliers raise it much less than they would raise a mean distance.
/// An empty point set scores 0.
pub fn difference(
    transform: Option<&SpaceTransform>,
    dst_points: &[Point3<f64>],
    src: &PolyMesh,
) -> f64 {
    if dst_points.is_empty() {
        return 0.0;
    }

    let mut query = SpatialQuery::new(src.bvh_verts());
    let mut total = 0.0;
    for p in dst_points {
        let co = apply_opt(transform, p);
        total += match query.nearest(&co, f64::INFINITY) {
            Some(hit) => 1.0 / (hit.distance + 1.0),
            None => NO_MATCH_CONTRIBUTION,
        };
    }
    dst_points.len() as f64 / total - 1.0
}

/// Best rigid (possibly mirrored) transform taking `dst_points` onto the
/// vertices of `src`.
///
/// The destination ellipsoid is matched onto the source one under each of
/// the eight axis sign combinations; the candidate with the lowest
/// [`difference`] wins, the earliest one on ties.
pub fn find_best_match(dst_points: &[Point3<f64>], src: &PolyMesh) -> AlignmentResult {
    let mat_src = eigen_matrix(src.positions());
    let mut mat_dst = eigen_matrix(dst_points);

    let mut candidates = Vec::with_capacity(MIRRORS.len() + 1);
    candidates.push(mat_dst);
    for mirror in MIRRORS {
        for (axis, sign) in mirror.iter().enumerate() {
            mat_dst.column_mut(axis).scale_mut(*sign);
        }
        candidates.push(mat_dst);
    }

    let scored: Vec<(SpaceTransform, f64)> = candidates
        .par_iter()
        .map(|mat| {
            let transform = SpaceTransform::global_from_matrices(mat, &mat_src);
            let score = difference(Some(&transform), dst_points, src);
            (transform, score)
        })
        .collect();

    let mut candidate_scores = [0.0; 8];
    let mut best = 0;
    for (i, (_, score)) in scored.iter().enumerate() {
        candidate_scores[i] = *score;
        if *score < scored[best].1 {
            best = i;
        }
    }
    log::debug!(
        "best alignment candidate {best} of {}, difference {:.6}",
        scored.len(),
        scored[best].1
    );

    AlignmentResult {
        transform: scored[best].0,
        score: scored[best].1,
        candidate_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Translation3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Octahedron and cube corners on the unit sphere: isotropic covariance.
    fn sphere_points() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for axis in 0..3 {
            for sign in [-1.0, 1.0] {
                let mut p = Point3::origin();
                p[axis] = sign;
                points.push(p);
            }
        }
        let c = 1.0 / 3.0f64.sqrt();
        for x in [-c, c] {
            for y in [-c, c] {
                for z in [-c, c] {
                    points.push(Point3::new(x, y, z));
                }
            }
        }
        points
    }

    /// A scattered, asymmetric cloud about 3 x 2 x 1 in size.
    fn cloud() -> PolyMesh {
        let mut rng = StdRng::seed_from_u64(7);
        let points = (0..40)
            .map(|_| {
                Point3::new(
                    3.0 * rng.random::<f64>(),
                    2.0 * rng.random::<f64>(),
                    rng.random::<f64>(),
                )
            })
            .collect();
        PolyMesh::from_points(points)
    }

    #[test]
    fn test_spherical_cloud_keeps_identity_orientation() {
        let m = eigen_matrix(&sphere_points());
        assert!(m.iter().all(|v| v.is_finite()));
        // Per axis: two octahedron points at 1, eight cube corners at 1 / 3.
        let sigma = ((2.0 + 8.0 / 3.0) / 13.0f64).sqrt();
        let expected = Matrix3::identity() * sigma;
        assert_relative_eq!(m.fixed_view::<3, 3>(0, 0).into_owned(), expected, epsilon = 1e-9);
        assert_relative_eq!(m.fixed_view::<3, 1>(0, 3).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(eigen_matrix(&[]), Matrix4::identity());
        let m = eigen_matrix(&[Point3::new(1.0, 2.0, 3.0)]);
        assert_eq!(m.fixed_view::<3, 1>(0, 3).into_owned(), Vector3::new(1.0, 2.0, 3.0));

        // Collinear points: two null variances are floored, not NaN.
        let line: Vec<_> = (0..4).map(|i| Point3::new(0.0, 0.0, i as f64)).collect();
        let m = eigen_matrix(&line);
        assert!(m.iter().all(|v| v.is_finite()));
        assert_relative_eq!(m.fixed_view::<3, 1>(0, 2).norm(), (5.0f64 / 3.0).sqrt(), epsilon = 1e-9);
        assert_relative_eq!(m.fixed_view::<3, 1>(0, 0).norm(), EIGEN_FLOOR, epsilon = 1e-12);
    }

    #[test]
    fn test_nearly_equal() {
        assert!(nearly_equal(1.0, 1.0 + 1e-9));
        assert!(nearly_equal(0.0, 1e-8));
        assert!(!nearly_equal(1.0, 1.001));
        assert!(!nearly_equal(-0.5, 0.5));
    }

    #[test]
    fn test_difference_score() {
        let cube = fixtures::cube();
        assert_eq!(difference(None, cube.positions(), &cube), 0.0);
        assert_eq!(difference(None, &[], &cube), 0.0);

        // One unit away from the nearest vertex: 1 / (1 / 2) - 1.
        let far = [Point3::new(-1.0, 0.0, 0.0)];
        assert_relative_eq!(difference(None, &far, &cube), 1.0, epsilon = 1e-12);

        let shift = SpaceTransform::from_matrix(Translation3::new(1.0, 0.0, 0.0).to_homogeneous());
        assert_relative_eq!(difference(Some(&shift), &far, &cube), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_recovers_rigid_motion() {
        let src = cloud();
        let motion = Translation3::new(5.0, -2.0, 1.0).to_homogeneous()
            * Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7).to_homogeneous();
        let dst: Vec<_> = src
            .positions()
            .iter()
            .map(|p| motion.transform_point(p))
            .collect();

        let result = find_best_match(&dst, &src);
        assert!(result.score < 1e-6, "score {}", result.score);
        assert_eq!(result.candidate_scores.iter().filter(|s| s.is_finite()).count(), 8);
        assert!(result.candidate_scores.iter().all(|&s| s >= result.score));
        for (p, q) in dst.iter().zip(src.positions()) {
            assert_relative_eq!(result.transform.apply(p), *q, epsilon = 1e-6);
        }
    }
}
