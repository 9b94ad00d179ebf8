//! Stateful nearest/ray queries against a [`Bvh`].

use nalgebra::{Point3, Vector3};

use super::bvh::{Bvh, NearestHit, RayHit};

/// Query stream over one tree.
///
/// The last nearest hit is kept between calls and used to bound the next
/// search, which pays off when successive query points are close to each
/// other (neighbouring destination elements). Each thread owns its own
/// stream; call [`reset`](Self::reset) when starting an unrelated sequence.
#[derive(Debug, Clone)]
pub struct SpatialQuery<'a> {
    tree: &'a Bvh,
    last: Option<NearestHit>,
}

impl<'a> SpatialQuery<'a> {
    /// Start a fresh stream over `tree`.
    pub fn new(tree: &'a Bvh) -> Self {
        Self { tree, last: None }
    }

    /// The tree being queried.
    #[inline]
    pub fn tree(&self) -> &'a Bvh {
        self.tree
    }

    /// Forget the previous hit.
    #[inline]
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Nearest primitive within `max_dist_sq` (squared distance) of `point`.
    ///
    /// A previous hit still within range bounds the search; one out of range
    /// is discarded first.
    pub fn nearest(&mut self, point: &Point3<f64>, max_dist_sq: f64) -> Option<NearestHit> {
        let bound = match self.last {
            Some(prev) => {
                let d2 = (point - prev.point).norm_squared();
                if d2 > max_dist_sq {
                    self.last = None;
                    max_dist_sq
                } else {
                    d2
                }
            }
            None => max_dist_sq,
        };

        let mut hit = self.tree.nearest(point, bound);
        if hit.is_none() && bound < max_dist_sq {
            // Rounding can put the previous primitive a hair past its own bound.
            hit = self.tree.nearest(point, max_dist_sq);
        }
        self.last = hit;
        hit.filter(|h| h.distance * h.distance <= max_dist_sq)
    }

    /// Closest primitive hit along `+dir` or `-dir` within `max_dist`.
    ///
    /// `radius` thickens every primitive so near misses still register.
    pub fn raycast(
        &self,
        point: &Point3<f64>,
        dir: &Vector3<f64>,
        radius: f64,
        max_dist: f64,
    ) -> Option<RayHit> {
        let forward = self.tree.raycast(point, dir, radius, max_dist);
        let bound = forward.map_or(max_dist, |h| h.distance);
        let backward = self.tree.raycast(point, &-dir, radius, bound);
        match (forward, backward) {
            (Some(f), Some(b)) if b.distance < f.distance => Some(b),
            (Some(f), _) => Some(f),
            (None, b) => b,
        }
        .filter(|h| h.distance <= max_dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::BvhPrimitive;
    use approx::assert_relative_eq;

    fn plane(z: f64) -> [BvhPrimitive; 2] {
        let a = Point3::new(-1.0, -1.0, z);
        let b = Point3::new(1.0, -1.0, z);
        let c = Point3::new(1.0, 1.0, z);
        let d = Point3::new(-1.0, 1.0, z);
        [BvhPrimitive::Triangle(a, b, c), BvhPrimitive::Triangle(a, c, d)]
    }

    #[test]
    fn test_raycast_prefers_closer_hit_behind() {
        // Facing the far plane at +3, with a closer plane 1 unit behind.
        let [t0, t1] = plane(3.0);
        let [t2, t3] = plane(-1.0);
        let bvh = Bvh::build([(0, t0), (0, t1), (1, t2), (1, t3)]);
        let query = SpatialQuery::new(&bvh);

        let hit = query
            .raycast(&Point3::new(0.2, 0.1, 0.0), &Vector3::z(), 0.0, f64::INFINITY)
            .unwrap();
        assert_eq!(hit.index, 1);
        assert_relative_eq!(hit.distance, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hit.point.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_raycast_forward_only_when_closer() {
        let [t0, t1] = plane(0.5);
        let [t2, t3] = plane(-4.0);
        let bvh = Bvh::build([(0, t0), (0, t1), (1, t2), (1, t3)]);
        let query = SpatialQuery::new(&bvh);

        let hit = query
            .raycast(&Point3::origin(), &Vector3::z(), 0.0, f64::INFINITY)
            .unwrap();
        assert_eq!(hit.index, 0);
        assert!(query
            .raycast(&Point3::origin(), &Vector3::z(), 0.0, 0.25)
            .is_none());
    }

    #[test]
    fn test_nearest_discards_stale_hit() {
        let pts = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        let bvh = Bvh::from_points(&pts, 0..2);
        let mut query = SpatialQuery::new(&bvh);

        let hit = query.nearest(&Point3::new(0.1, 0.0, 0.0), 1.0).unwrap();
        assert_eq!(hit.index, 0);

        // Far from everything: the previous hit must not leak through.
        assert!(query.nearest(&Point3::new(5.0, 50.0, 0.0), 1.0).is_none());

        let hit = query.nearest(&Point3::new(9.5, 0.0, 0.0), 1.0).unwrap();
        assert_eq!(hit.index, 1);
        assert_relative_eq!(hit.distance, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_reuses_previous_hit_as_bound() {
        let pts: Vec<Point3<f64>> = (0..20).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let bvh = Bvh::from_points(&pts, 0..pts.len());
        let mut query = SpatialQuery::new(&bvh);

        for i in 0..20 {
            let hit = query
                .nearest(&Point3::new(i as f64 + 0.3, 0.2, 0.0), f64::INFINITY)
                .unwrap();
            assert_eq!(hit.index, i);
        }
        query.reset();
        let hit = query.nearest(&Point3::new(4.6, 0.0, 0.0), f64::INFINITY).unwrap();
        assert_eq!(hit.index, 5);
    }
}
