//! Reusable per-thread buffers for polygon interpolation.

use nalgebra::Point3;

use super::map::ItemSources;
use crate::geometry::math::interp_weights_poly;
use crate::mesh::PolyMesh;

const DEFAULT_CAPACITY: usize = 32;

/// What a face lookup reports as source indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaceSource {
    /// Vertex indices of the face corners.
    Verts,
    /// Corner indices.
    Corners,
}

/// Growable scratch space for the corners of one source face at a time.
///
/// Owned by a single remap worker; never shared between threads.
#[derive(Debug, Clone)]
pub(crate) struct InterpScratch {
    positions: Vec<Point3<f64>>,
    indices: Vec<usize>,
    weights: Vec<f64>,
}

impl Default for InterpScratch {
    fn default() -> Self {
        Self {
            positions: Vec::with_capacity(DEFAULT_CAPACITY),
            indices: Vec::with_capacity(DEFAULT_CAPACITY),
            weights: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }
}

impl InterpScratch {
    /// Make room for at least `n` corners, resizing every buffer to `n`.
    pub(crate) fn ensure_capacity(&mut self, n: usize) {
        self.positions.resize(n, Point3::origin());
        self.indices.resize(n, 0);
        self.weights.resize(n, 0.0);
    }

    /// Load the corners of `face` into the buffers.
    fn load(&mut self, mesh: &PolyMesh, face: usize, source: FaceSource) -> usize {
        let corners = mesh.face_corners(face);
        let n = corners.len();
        self.ensure_capacity(n);
        for (slot, c) in corners.enumerate() {
            let v = mesh.corner_verts()[c];
            self.positions[slot] = mesh.positions()[v];
            self.indices[slot] = match source {
                FaceSource::Verts => v,
                FaceSource::Corners => c,
            };
        }
        n
    }

    /// Mean-value weights of `point` over the corners of `face`.
    pub(crate) fn face_weights(
        &mut self,
        mesh: &PolyMesh,
        face: usize,
        point: &Point3<f64>,
        source: FaceSource,
        island: usize,
    ) -> ItemSources {
        let n = self.load(mesh, face, source);
        interp_weights_poly(&self.positions[..n], point, &mut self.weights[..n]);
        ItemSources::weighted(&self.indices[..n], &self.weights[..n], island)
    }

    /// The corner (or vertex) of `face` closest to `point`.
    ///
    /// The first corner wins exact ties.
    pub(crate) fn closest_corner(
        &mut self,
        mesh: &PolyMesh,
        face: usize,
        point: &Point3<f64>,
        source: FaceSource,
    ) -> usize {
        let n = self.load(mesh, face, source);
        let mut best = self.indices[0];
        let mut best_dist_sq = f64::MAX;
        for slot in 0..n {
            let d2 = (point - self.positions[slot]).norm_squared();
            if d2 < best_dist_sq {
                best_dist_sq = d2;
                best = self.indices[slot];
            }
        }
        best
    }
}
