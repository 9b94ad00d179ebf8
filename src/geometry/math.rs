//! Scalar geometry kernels shared by the spatial index and the remappers.
//!
//! Everything here is a free function over `nalgebra` points and vectors.
//! Ray functions expect a unit-length direction and report hit distances
//! along it.

use nalgebra::{Matrix3, Point2, Point3, Vector3};
use rand::Rng;

/// Tolerance used by [`interp_weights_poly`], relative to the polygon extent.
const POLY_WEIGHT_EPS: f64 = 16.0 * f32::EPSILON as f64;

/// Factor of `p` projected on the line through `l1` and `l2`.
///
/// Returns 0 at `l1`, 1 at `l2` and is unclamped. A zero-length line yields 0.
#[inline]
pub fn line_point_factor(p: &Point3<f64>, l1: &Point3<f64>, l2: &Point3<f64>) -> f64 {
    let u = l2 - l1;
    let len_sq = u.norm_squared();
    if len_sq > 0.0 {
        u.dot(&(p - l1)) / len_sq
    } else {
        0.0
    }
}

/// Closest point to `p` on the segment `a`-`b`.
#[inline]
pub fn closest_on_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    let t = line_point_factor(p, a, b).clamp(0.0, 1.0);
    a + (b - a) * t
}

/// Squared distance from `p` to the segment `a`-`b`.
#[inline]
pub fn dist_sq_to_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (p - closest_on_segment(p, a, b)).norm_squared()
}

/// Closest point to `p` on the triangle `a`, `b`, `c`.
///
/// Voronoi-region walk from Ericson, "Real-Time Collision Detection", 5.1.5.
pub fn closest_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = va + vb + vc;
    if denom == 0.0 {
        // Collinear corners: fall back to the closest edge.
        let candidates = [
            closest_on_segment(p, a, b),
            closest_on_segment(p, b, c),
            closest_on_segment(p, c, a),
        ];
        return candidates
            .into_iter()
            .min_by(|x, y| (p - x).norm_squared().total_cmp(&(p - y).norm_squared()))
            .unwrap_or(*a);
    }
    let v = vb / denom;
    let w = vc / denom;
    a + ab * v + ac * w
}

/// Nearest points between the infinite lines `a1`-`a2` and `b1`-`b2`.
///
/// Returns `(on_a, on_b)`, or `None` when a line is degenerate or the lines
/// are parallel.
pub fn closest_line_line(
    a1: &Point3<f64>,
    a2: &Point3<f64>,
    b1: &Point3<f64>,
    b2: &Point3<f64>,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let da = a2 - a1;
    let db = b2 - b1;
    let r = a1 - b1;

    let a = da.dot(&da);
    let e = db.dot(&db);
    let b = da.dot(&db);
    let denom = a * e - b * b;
    if a == 0.0 || e == 0.0 || denom <= f64::EPSILON * a * e {
        return None;
    }

    let c = da.dot(&r);
    let f = db.dot(&r);
    let s = (b * f - c * e) / denom;
    let t = (a * f - b * c) / denom;
    Some((a1 + da * s, b1 + db * t))
}

/// Möller–Trumbore ray/triangle intersection, accepting both windings.
///
/// Returns the distance along `dir` when the hit lies in front of `origin`.
pub fn ray_triangle(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<f64> {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() <= f64::EPSILON * e1.norm() * e2.norm() {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(&e1);
    let v = dir.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&q) * inv_det;
    (t >= 0.0).then_some(t)
}

/// Ray test against a triangle thickened by `radius`.
///
/// An exact hit is preferred. Otherwise, when `radius > 0`, the ray counts as
/// hitting if it crosses the triangle plane within `radius` of the triangle;
/// the reported point is the closest point on the triangle.
pub fn ray_triangle_radius(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    radius: f64,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<(f64, Point3<f64>)> {
    if let Some(t) = ray_triangle(origin, dir, a, b, c) {
        return Some((t, origin + dir * t));
    }
    if radius <= 0.0 {
        return None;
    }

    let normal = (b - a).cross(&(c - a));
    let denom = normal.dot(dir);
    if denom.abs() <= f64::EPSILON * normal.norm() {
        return None;
    }
    let t = normal.dot(&(a - origin)) / denom;
    if t < 0.0 {
        return None;
    }
    let on_plane = origin + dir * t;
    let closest = closest_on_triangle(&on_plane, a, b, c);
    ((on_plane - closest).norm_squared() <= radius * radius).then_some((t, closest))
}

/// Ray test against a point thickened by `radius`.
///
/// Reports the distance to the ray's closest approach and that point on the ray.
pub fn ray_point(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    radius: f64,
    v: &Point3<f64>,
) -> Option<(f64, Point3<f64>)> {
    let t = (v - origin).dot(dir);
    if t < 0.0 {
        return None;
    }
    let on_ray = origin + dir * t;
    ((on_ray - v).norm_squared() <= radius * radius).then_some((t, on_ray))
}

/// Ray test against a segment thickened by `radius`.
///
/// A zero-length segment is tested as a point; a ray parallel to the segment
/// never hits.
pub fn ray_segment(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    radius: f64,
    a: &Point3<f64>,
    b: &Point3<f64>,
) -> Option<(f64, Point3<f64>)> {
    if a == b {
        return ray_point(origin, dir, radius, a);
    }
    let radius_sq = radius * radius;
    let ray_end = origin + dir;
    let (on_segment, on_ray) = closest_line_line(a, b, origin, &ray_end)?;
    if (on_segment - on_ray).norm_squared() > radius_sq {
        return None;
    }
    let fac = line_point_factor(&on_segment, a, b);
    let clamped = if fac < 0.0 {
        *a
    } else if fac > 1.0 {
        *b
    } else {
        on_segment
    };
    ray_point(origin, dir, radius, &clamped)
}

/// Arithmetic mean of a set of points.
pub fn centroid<I>(points: I) -> Point3<f64>
where
    I: IntoIterator<Item = Point3<f64>>,
{
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for p in points {
        sum += p.coords;
        count += 1;
    }
    if count == 0 {
        Point3::origin()
    } else {
        Point3::from(sum / count as f64)
    }
}

/// Polygon normal by Newell's method, normalized (zero for degenerate polygons).
pub fn newell_normal<I>(points: I) -> Vector3<f64>
where
    I: IntoIterator<Item = Point3<f64>>,
    I::IntoIter: Clone,
{
    let iter = points.into_iter();
    let Some(mut prev) = iter.clone().last() else {
        return Vector3::zeros();
    };
    let mut normal = Vector3::zeros();
    for curr in iter {
        normal.x += (prev.y - curr.y) * (prev.z + curr.z);
        normal.y += (prev.z - curr.z) * (prev.x + curr.x);
        normal.z += (prev.x - curr.x) * (prev.y + curr.y);
        prev = curr;
    }
    normal.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

fn mean_value_half_tan(d_curr: &(Vector3<f64>, f64), d_next: &(Vector3<f64>, f64)) -> f64 {
    let area = d_curr.0.cross(&d_next.0).norm();
    if area != 0.0 {
        let dot = d_curr.0.dot(&d_next.0);
        let len = d_curr.1 * d_next.1;
        let result = (len - dot) / area;
        if result.is_finite() {
            return result;
        }
    }
    0.0
}

/// Mean value interpolation weights of `co` over the polygon `points`.
///
/// Writes one weight per polygon corner into `weights[..points.len()]`; the
/// weights sum to 1. A point lying on a corner or an edge (within a tolerance
/// relative to the polygon extent) snaps to that corner or interpolates
/// linearly along that edge. Polygons giving no usable weight (all corners
/// coincident with `co`, or degenerate) get uniform weights.
pub fn interp_weights_poly(points: &[Point3<f64>], co: &Point3<f64>, weights: &mut [f64]) {
    let n = points.len();
    let weights = &mut weights[..n];
    if n == 0 {
        return;
    }

    let max_value = points
        .iter()
        .flat_map(|p| {
            let d = p - co;
            [d.x.abs(), d.y.abs(), d.z.abs()]
        })
        .fold(0.0f64, f64::max);
    if n < 3 || max_value == 0.0 {
        weights.fill(1.0 / n as f64);
        return;
    }

    enum Snap {
        Point,
        Segment,
    }

    let eps = POLY_WEIGHT_EPS * max_value;
    let eps_sq = eps * eps;
    let dir = |i: usize| {
        let d = points[i] - co;
        let len = d.norm();
        (d, len)
    };

    let mut i_curr = n - 1;
    let mut i_next = 0;
    let mut d_curr = dir(n - 2);
    let mut d_next = dir(n - 1);
    let mut ht_prev = mean_value_half_tan(&d_curr, &d_next);
    let mut total = 0.0;
    let mut snap = None;

    while i_next < n {
        if d_next.1 < eps {
            snap = Some(Snap::Point);
            break;
        }
        if dist_sq_to_segment(co, &points[i_curr], &points[i_next]) < eps_sq {
            snap = Some(Snap::Segment);
            break;
        }

        d_curr = d_next;
        d_next = dir(i_next);
        let ht = mean_value_half_tan(&d_curr, &d_next);
        weights[i_curr] = (ht_prev + ht) / d_curr.1;
        total += weights[i_curr];

        i_curr = i_next;
        i_next += 1;
        ht_prev = ht;
    }

    match snap {
        Some(Snap::Point) => {
            weights.fill(0.0);
            weights[i_curr] = 1.0;
        }
        Some(Snap::Segment) => {
            weights.fill(0.0);
            let fac = line_point_factor(co, &points[i_curr], &points[i_next]).clamp(0.0, 1.0);
            weights[i_curr] = 1.0 - fac;
            weights[i_next] = fac;
        }
        None if total != 0.0 && total.is_finite() => {
            for w in weights.iter_mut() {
                *w /= total;
            }
        }
        None => weights.fill(1.0 / n as f64),
    }
}

/// Two unit vectors completing `n` (assumed unit length) to an orthonormal basis.
pub fn ortho_basis(n: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let f = n.x * n.x + n.y * n.y;
    if f > f32::EPSILON as f64 {
        let d = 1.0 / f.sqrt();
        let n1 = Vector3::new(n.y * d, -n.x * d, 0.0);
        let n2 = Vector3::new(-n.z * n1.y, n.z * n1.x, n.x * n1.y - n.y * n1.x);
        (n1, n2)
    } else {
        let sign = if n.z < 0.0 { -1.0 } else { 1.0 };
        (Vector3::new(sign, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0))
    }
}

/// Rotation taking 3D points into the plane orthogonal to `normal`.
///
/// The rows are the two basis vectors from [`ortho_basis`] followed by the
/// normal, so the third coordinate of a projected point is its height along
/// `normal`. The inverse is the transpose.
pub fn axis_dominant_to_2d(normal: &Vector3<f64>) -> Matrix3<f64> {
    let (b0, b1) = ortho_basis(normal);
    Matrix3::from_rows(&[b0.transpose(), b1.transpose(), normal.transpose()])
}

/// Unsigned area of a 2D polygon.
pub fn area_poly_2d(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    let mut cross = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        cross += a.x * b.y - b.x * a.y;
    }
    (cross * 0.5).abs()
}

/// Unsigned area of a 2D triangle.
#[inline]
pub fn area_tri_2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)) * 0.5).abs()
}

/// Uniformly distributed random point inside a 2D triangle.
pub fn sample_triangle_2d<R: Rng>(
    rng: &mut R,
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
) -> Point2<f64> {
    let mut u = rng.random::<f64>();
    let mut v = rng.random::<f64>();
    if u + v > 1.0 {
        u = 1.0 - u;
        v = 1.0 - v;
    }
    a + (b - a) * u + (c - a) * v
}

fn slerp_weights(t: f64, cos_omega: f64) -> (f64, f64) {
    const EPS: f64 = 1e-4;
    if cos_omega.abs() < 1.0 - EPS {
        let omega = cos_omega.acos();
        let sin_omega = omega.sin();
        (
            ((1.0 - t) * omega).sin() / sin_omega,
            (t * omega).sin() / sin_omega,
        )
    } else {
        (1.0 - t, t)
    }
}

fn slerp(a: &Vector3<f64>, b: &Vector3<f64>, t: f64) -> Option<Vector3<f64>> {
    let cos_omega = a.dot(b);
    if cos_omega < -1.0 + f32::EPSILON as f64 {
        return None;
    }
    let (wa, wb) = slerp_weights(t, cos_omega);
    Some(a * wa + b * wb)
}

/// Spherical interpolation between two unit normals.
///
/// Opposite normals, for which the great arc is undefined, rotate through an
/// arbitrary orthogonal axis.
pub fn slerp_normals_safe(a: &Vector3<f64>, b: &Vector3<f64>, t: f64) -> Vector3<f64> {
    if let Some(v) = slerp(a, b, t) {
        return v;
    }
    let (ortho, _) = ortho_basis(a);
    if t < 0.5 {
        slerp(a, &ortho, t * 2.0).unwrap_or(*a)
    } else {
        slerp(&ortho, b, (t - 0.5) * 2.0).unwrap_or(*b)
    }
}

/// Angle between two vectors in radians (0 when either is zero).
#[inline]
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let denom = a.norm() * b.norm();
    if denom == 0.0 {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}
