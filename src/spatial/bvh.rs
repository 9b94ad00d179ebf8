//! Bounding volume hierarchy over points, segments and triangles.
//!
//! Trees are built from `(element id, primitive)` pairs. The id is what a
//! query reports, so a tree built over a subset of a mesh (one island, say)
//! still answers in the mesh's own element numbering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{Point3, Vector3};

use crate::geometry::math::{
    closest_on_segment, closest_on_triangle, ray_point, ray_segment, ray_triangle_radius,
};

/// Geometry stored in a [`Bvh`] leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BvhPrimitive {
    /// A single position.
    Point(Point3<f64>),
    /// A line segment.
    Segment(Point3<f64>, Point3<f64>),
    /// A triangle.
    Triangle(Point3<f64>, Point3<f64>, Point3<f64>),
}

impl BvhPrimitive {
    fn bounds(&self) -> Aabb {
        match self {
            BvhPrimitive::Point(p) => Aabb::point(p),
            BvhPrimitive::Segment(a, b) => Aabb::point(a).grow(b),
            BvhPrimitive::Triangle(a, b, c) => Aabb::point(a).grow(b).grow(c),
        }
    }

    /// Closest point on the primitive to `p`.
    pub fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        match self {
            BvhPrimitive::Point(v) => *v,
            BvhPrimitive::Segment(a, b) => closest_on_segment(p, a, b),
            BvhPrimitive::Triangle(a, b, c) => closest_on_triangle(p, a, b, c),
        }
    }

    fn raycast(
        &self,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        radius: f64,
    ) -> Option<(f64, Point3<f64>)> {
        match self {
            BvhPrimitive::Point(v) => ray_point(origin, dir, radius, v),
            BvhPrimitive::Segment(a, b) => ray_segment(origin, dir, radius, a, b),
            BvhPrimitive::Triangle(a, b, c) => ray_triangle_radius(origin, dir, radius, a, b, c),
        }
    }
}

/// Result of a nearest-primitive query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    /// Element id of the primitive.
    pub index: usize,
    /// Distance from the query point to `point`.
    pub distance: f64,
    /// Closest point on the primitive.
    pub point: Point3<f64>,
}

/// Result of a ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Element id of the primitive.
    pub index: usize,
    /// Distance along the ray.
    pub distance: f64,
    /// Hit location.
    pub point: Point3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn point(p: &Point3<f64>) -> Self {
        Self { min: *p, max: *p }
    }

    fn grow(self, p: &Point3<f64>) -> Self {
        Self {
            min: self.min.inf(p),
            max: self.max.sup(p),
        }
    }

    fn union(self, other: &Aabb) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    fn distance_squared_to(&self, p: &Point3<f64>) -> f64 {
        let mut d2 = 0.0;
        for i in 0..3 {
            let d = if p[i] < self.min[i] {
                self.min[i] - p[i]
            } else if p[i] > self.max[i] {
                p[i] - self.max[i]
            } else {
                0.0
            };
            d2 += d * d;
        }
        d2
    }

    /// Slab test against the box inflated by `pad`, limited to `[0, t_max]`.
    fn hit_by_ray(&self, origin: &Point3<f64>, dir: &Vector3<f64>, pad: f64, t_max: f64) -> bool {
        let mut t0 = 0.0f64;
        let mut t1 = t_max;
        for i in 0..3 {
            let (lo, hi) = (self.min[i] - pad, self.max[i] + pad);
            if dir[i].abs() <= 1e-15 {
                if origin[i] < lo || origin[i] > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let mut near = (lo - origin[i]) * inv;
            let mut far = (hi - origin[i]) * inv;
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t1 < t0 {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    /// Left child for inner nodes, first item slot for leaves.
    left: u32,
    right: u32,
    count: u32,
}

impl BvhNode {
    fn is_leaf(&self) -> bool {
        self.count != 0
    }
}

/// Static BVH with median splits on the longest centroid axis.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    items: Vec<(usize, BvhPrimitive)>,
}

impl Bvh {
    const LEAF_SIZE: usize = 4;

    /// Build a tree from `(element id, primitive)` pairs.
    ///
    /// An empty input gives an empty tree that never reports a hit.
    pub fn build<I>(items: I) -> Self
    where
        I: IntoIterator<Item = (usize, BvhPrimitive)>,
    {
        let items: Vec<(usize, BvhPrimitive)> = items.into_iter().collect();
        let mut bvh = Self {
            nodes: Vec::with_capacity(items.len().saturating_mul(2) / Self::LEAF_SIZE + 1),
            items,
        };
        if !bvh.items.is_empty() {
            let bounds: Vec<Aabb> = bvh.items.iter().map(|(_, p)| p.bounds()).collect();
            let mut order: Vec<u32> = (0..bvh.items.len() as u32).collect();
            bvh.build_node(&bounds, &mut order, 0, bounds.len());
            // Store leaf items contiguously in traversal order.
            let items = std::mem::take(&mut bvh.items);
            bvh.items = order.iter().map(|&i| items[i as usize]).collect();
        }
        bvh
    }

    /// Tree over points, one per id.
    pub fn from_points<I>(positions: &[Point3<f64>], ids: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Self::build(
            ids.into_iter()
                .map(|i| (i, BvhPrimitive::Point(positions[i]))),
        )
    }

    /// Number of primitives in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the tree holds no primitives.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn build_node(&mut self, bounds: &[Aabb], order: &mut [u32], start: usize, end: usize) -> u32 {
        let node_index = self.nodes.len() as u32;
        let mut node_bounds = bounds[order[start] as usize];
        let mut centers = Aabb::point(&node_bounds.center());
        for &i in &order[start + 1..end] {
            node_bounds = node_bounds.union(&bounds[i as usize]);
            centers = centers.grow(&bounds[i as usize].center());
        }
        self.nodes.push(BvhNode {
            bounds: node_bounds,
            left: start as u32,
            right: 0,
            count: (end - start) as u32,
        });

        let count = end - start;
        if count <= Self::LEAF_SIZE {
            return node_index;
        }

        let extent = centers.max - centers.min;
        let axis = extent.imax();
        let mid = start + count / 2;
        order[start..end].select_nth_unstable_by(mid - start, |a, b| {
            let ca = bounds[*a as usize].center()[axis];
            let cb = bounds[*b as usize].center()[axis];
            ca.total_cmp(&cb)
        });

        let left = self.build_node(bounds, order, start, mid);
        let right = self.build_node(bounds, order, mid, end);
        let node = &mut self.nodes[node_index as usize];
        node.left = left;
        node.right = right;
        node.count = 0;
        node_index
    }

    fn leaf_items(&self, node: &BvhNode) -> &[(usize, BvhPrimitive)] {
        let start = node.left as usize;
        &self.items[start..start + node.count as usize]
    }

    /// Closest primitive to `point` whose squared distance is at most `bound_sq`.
    ///
    /// The bound itself is inclusive; among primitives closer than the bound,
    /// the first one found wins exact ties.
    pub fn nearest(&self, point: &Point3<f64>, bound_sq: f64) -> Option<NearestHit> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut best_dist_sq = bound_sq;
        let mut best: Option<(usize, Point3<f64>)> = None;

        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            dist_sq: self.nodes[0].bounds.distance_squared_to(point),
            node: 0,
        });

        while let Some(entry) = heap.pop() {
            if entry.dist_sq > best_dist_sq {
                break;
            }

            let node = self.nodes[entry.node as usize];
            if node.is_leaf() {
                for (id, prim) in self.leaf_items(&node) {
                    let closest = prim.closest_point(point);
                    let d2 = (point - closest).norm_squared();
                    let better = if best.is_none() {
                        d2 <= best_dist_sq
                    } else {
                        d2 < best_dist_sq
                    };
                    if better {
                        best_dist_sq = d2;
                        best = Some((*id, closest));
                    }
                }
                continue;
            }

            for child in [node.left, node.right] {
                let d2 = self.nodes[child as usize].bounds.distance_squared_to(point);
                if d2 <= best_dist_sq {
                    heap.push(HeapEntry { dist_sq: d2, node: child });
                }
            }
        }

        best.map(|(index, p)| NearestHit {
            index,
            distance: best_dist_sq.sqrt(),
            point: p,
        })
    }

    /// First primitive hit by the ray `origin + t * dir`, `0 <= t < max_dist`.
    ///
    /// `dir` must be unit length. Primitives are thickened by `radius`.
    pub fn raycast(
        &self,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        radius: f64,
        max_dist: f64,
    ) -> Option<RayHit> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut best: Option<RayHit> = None;
        let mut best_dist = max_dist;
        let mut stack = vec![0u32];

        while let Some(node_index) = stack.pop() {
            let node = self.nodes[node_index as usize];
            if !node.bounds.hit_by_ray(origin, dir, radius, best_dist) {
                continue;
            }

            if node.is_leaf() {
                for (id, prim) in self.leaf_items(&node) {
                    if let Some((t, point)) = prim.raycast(origin, dir, radius) {
                        if t < best_dist {
                            best_dist = t;
                            best = Some(RayHit {
                                index: *id,
                                distance: t,
                                point,
                            });
                        }
                    }
                }
                continue;
            }

            stack.push(node.right);
            stack.push(node.left);
        }

        best
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist_sq: f64,
    node: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist_sq == other.dist_sq && self.node == other.node
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap pops the closest box first.
        other
            .dist_sq
            .total_cmp(&self.dist_sq)
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_points(n: usize) -> Vec<Point3<f64>> {
        let mut pts = Vec::new();
        for i in 0..n {
            for j in 0..n {
                pts.push(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        pts
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let pts = grid_points(12);
        let bvh = Bvh::from_points(&pts, 0..pts.len());
        assert_eq!(bvh.len(), 144);

        for q in [
            Point3::new(3.2, 4.9, 0.5),
            Point3::new(-2.0, 7.1, 0.0),
            Point3::new(11.4, 11.6, -3.0),
        ] {
            let hit = bvh.nearest(&q, f64::INFINITY).unwrap();
            let brute = pts
                .iter()
                .enumerate()
                .min_by(|a, b| (q - a.1).norm_squared().total_cmp(&(q - b.1).norm_squared()))
                .unwrap();
            assert_eq!(hit.index, brute.0);
            assert_relative_eq!(hit.distance, (q - brute.1).norm(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_nearest_respects_bound() {
        let pts = grid_points(4);
        let bvh = Bvh::from_points(&pts, 0..pts.len());
        let q = Point3::new(0.0, 0.0, 2.0);
        assert!(bvh.nearest(&q, 3.9).is_none());
        // The bound is inclusive.
        assert_eq!(bvh.nearest(&q, 4.0).unwrap().index, 0);
    }

    #[test]
    fn test_subset_reports_original_ids() {
        let pts = grid_points(4);
        let bvh = Bvh::from_points(&pts, [5, 9, 15]);
        let hit = bvh.nearest(&Point3::new(0.0, 0.0, 0.0), f64::INFINITY).unwrap();
        assert_eq!(hit.index, 5);
    }

    #[test]
    fn test_raycast_triangles_picks_closest() {
        let tri = |z: f64| {
            BvhPrimitive::Triangle(
                Point3::new(-1.0, -1.0, z),
                Point3::new(1.0, -1.0, z),
                Point3::new(0.0, 1.0, z),
            )
        };
        let bvh = Bvh::build([(7, tri(5.0)), (3, tri(2.0)), (4, tri(-1.0))]);
        let hit = bvh
            .raycast(&Point3::origin(), &Vector3::z(), 0.0, f64::INFINITY)
            .unwrap();
        assert_eq!(hit.index, 3);
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-12);

        assert!(bvh
            .raycast(&Point3::origin(), &Vector3::z(), 0.0, 1.5)
            .is_none());
    }

    #[test]
    fn test_raycast_segment_with_radius() {
        let seg = BvhPrimitive::Segment(Point3::new(-1.0, 0.1, 3.0), Point3::new(1.0, 0.1, 3.0));
        let bvh = Bvh::build([(0, seg)]);
        assert!(bvh
            .raycast(&Point3::origin(), &Vector3::z(), 0.0, f64::INFINITY)
            .is_none());
        let hit = bvh
            .raycast(&Point3::origin(), &Vector3::z(), 0.2, f64::INFINITY)
            .unwrap();
        assert_eq!(hit.index, 0);
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_tree() {
        let bvh = Bvh::build(std::iter::empty());
        assert!(bvh.is_empty());
        assert!(bvh.nearest(&Point3::origin(), f64::INFINITY).is_none());
        assert!(bvh
            .raycast(&Point3::origin(), &Vector3::x(), 1.0, f64::INFINITY)
            .is_none());
    }
}
