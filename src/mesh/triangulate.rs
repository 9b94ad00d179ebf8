//! Polygon triangulation.
//!
//! Faces with more than four corners are projected onto the plane orthogonal
//! to their normal and ear-clipped. Output triangles index into the input
//! polygon and keep its winding.

use nalgebra::{Point2, Point3, Vector3};

use crate::geometry::math::axis_dominant_to_2d;

/// Triangulate a simple 2D polygon into `n - 2` triangles.
///
/// Quads use the `0-2` diagonal unless the polygon is concave at corner 1 or
/// 3, in which case the `1-3` diagonal is used. Larger polygons are
/// ear-clipped; if clipping stalls on degenerate input the remaining ring is
/// fanned so the triangle count always stays `n - 2`.
pub fn triangulate_polygon_2d(points: &[Point2<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    match n {
        0..=2 => Vec::new(),
        3 => vec![[0, 1, 2]],
        4 => triangulate_quad(points),
        _ => earclip(points),
    }
}

/// Triangulate a planar-ish 3D polygon with the given unit normal.
pub fn triangulate_polygon_3d(points: &[Point3<f64>], normal: &Vector3<f64>) -> Vec<[usize; 3]> {
    match points.len() {
        0..=2 => Vec::new(),
        3 => vec![[0, 1, 2]],
        _ => {
            let to_2d = axis_dominant_to_2d(normal);
            let projected: Vec<Point2<f64>> = points
                .iter()
                .map(|p| {
                    let q = to_2d * p.coords;
                    Point2::new(q.x, q.y)
                })
                .collect();
            triangulate_polygon_2d(&projected)
        }
    }
}

fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        area += a.x * b.y - b.x * a.y;
    }
    0.5 * area
}

fn triangulate_quad(points: &[Point2<f64>]) -> Vec<[usize; 3]> {
    let sign = signed_area(points).signum();
    let convex_at = |i: usize| {
        let prev = &points[(i + 3) % 4];
        let next = &points[(i + 1) % 4];
        orient2d(prev, &points[i], next) * sign >= 0.0
    };
    if convex_at(1) && convex_at(3) {
        vec![[0, 1, 2], [0, 2, 3]]
    } else {
        vec![[1, 2, 3], [1, 3, 0]]
    }
}

fn point_in_triangle(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, p: &Point2<f64>) -> bool {
    let d1 = orient2d(a, b, p);
    let d2 = orient2d(b, c, p);
    let d3 = orient2d(c, a, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn is_ear(points: &[Point2<f64>], ring: &[usize], slot: usize, ccw: bool) -> bool {
    let m = ring.len();
    let prev = ring[(slot + m - 1) % m];
    let ear = ring[slot];
    let next = ring[(slot + 1) % m];
    let (a, b, c) = (&points[prev], &points[ear], &points[next]);

    let cross = orient2d(a, b, c);
    if (ccw && cross <= 0.0) || (!ccw && cross >= 0.0) {
        return false;
    }

    ring.iter()
        .filter(|&&v| v != prev && v != ear && v != next)
        .map(|&v| &points[v])
        .filter(|p| *p != a && *p != b && *p != c)
        .all(|p| !point_in_triangle(a, b, c, p))
}

fn earclip(points: &[Point2<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    let ccw = signed_area(points) >= 0.0;
    let mut ring: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    let mut slot = 0usize;
    let mut misses = 0usize;
    while ring.len() > 3 {
        let m = ring.len();
        if is_ear(points, &ring, slot, ccw) {
            triangles.push([ring[(slot + m - 1) % m], ring[slot], ring[(slot + 1) % m]]);
            ring.remove(slot);
            if slot >= ring.len() {
                slot = 0;
            }
            misses = 0;
            continue;
        }

        slot = (slot + 1) % m;
        misses += 1;
        if misses > m {
            // No ear left: degenerate or self-intersecting ring.
            for k in 1..ring.len() - 1 {
                triangles.push([ring[0], ring[k], ring[k + 1]]);
            }
            return triangles;
        }
    }

    triangles.push([ring[0], ring[1], ring[2]]);
    triangles
}
