//! Mesh-to-mesh element correspondence.
//!
//! For every element of a destination mesh (vertex, edge, face corner or
//! face) the remappers find the source mesh elements it corresponds to and
//! how much each one contributes. The result is a [`CorrespondenceMap`]:
//! one weighted source list per destination element, ready for attribute
//! transfer.
//!
//! # Entry points
//!
//! - [`remap_verts`]: destination vertices
//! - [`remap_edges`]: destination edges
//! - [`remap_corners`]: destination face corners, island aware
//! - [`remap_faces`]: destination faces
//! - [`find_best_match`]: automatic alignment of the two meshes
//!
//! Each entry point has a `_with_progress` variant.
//!
//! # Example
//!
//! ```
//! use meshpair::prelude::*;
//! use nalgebra::Point3;
//!
//! let source = PolyMesh::from_quads(
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     &[[0, 1, 2, 3]],
//! )
//! .unwrap();
//! let destination = PolyMesh::from_points(vec![Point3::new(0.9, 0.2, 0.1)]);
//!
//! let mut map = CorrespondenceMap::default();
//! let status = remap_verts(
//!     RemapMode::VertNearest,
//!     &source,
//!     &destination,
//!     &RemapOptions::default(),
//!     &mut map,
//! )
//! .unwrap();
//!
//! assert_eq!(status, RemapStatus::Complete);
//! assert_eq!(map.item(0).sources, &[1]);
//! ```

mod align;
mod astar;
mod corner;
mod diagnostics;
mod edge;
mod face;
mod graph;
mod islands;
mod map;
mod progress;
mod scratch;
mod vert;

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::geometry::SpaceTransform;

pub use align::{difference, eigen_matrix, find_best_match, AlignmentResult};
pub use astar::{AStarGraph, AStarLink, AStarSolver};
pub use corner::{remap_corners, remap_corners_with_progress};
pub use diagnostics::{Diagnostics, Level};
pub use edge::{remap_edges, remap_edges_with_progress};
pub use face::{remap_faces, remap_faces_with_progress};
pub use graph::{EdgeKind, IslandGraph};
pub use islands::{Island, IslandClassifier, IslandStore, SeamIslands};
pub use map::{CorrespondenceItem, CorrespondenceMap};
pub use progress::Progress;
pub use vert::{remap_verts, remap_verts_with_progress};

/// Ray retries for thick rays: each retry widens the ray five-fold and
/// weighs its hit five times less.
pub(crate) const APPROXIMATE_RAY_ATTEMPTS: usize = 3;
const APPROXIMATE_RAY_FACTOR: f64 = 5.0;

/// Upper bound of the seam-correction path search.
pub(crate) const ASTAR_STEPS_MAX: usize = 64;

/// Destination elements resolved between two progress reports.
const BATCH_SIZE: usize = 4096;

/// Kind of mesh element being remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Vertices.
    Vertex,
    /// Edges.
    Edge,
    /// Face corners.
    Corner,
    /// Faces.
    Face,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
            ElementKind::Corner => "corner",
            ElementKind::Face => "face",
        })
    }
}

/// Strategy used to find the sources of a destination element.
///
/// [`Topology`](RemapMode::Topology) works for every element kind; every
/// other mode belongs to exactly one kind (see [`element`](Self::element)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemapMode {
    /// Same index on both meshes; element counts must match.
    Topology,

    /// Nearest source vertex.
    VertNearest,
    /// Nearest source edge, then its closer endpoint.
    VertEdgeNearest,
    /// Nearest source edge, both endpoints linearly weighted.
    VertEdgeInterpNearest,
    /// Nearest source face, then its corner vertex closest to the hit.
    VertFaceNearest,
    /// Nearest source face, all its vertices interpolated.
    VertPolyInterpNearest,
    /// Source face hit along the destination vertex normal, interpolated.
    VertPolyInterpNormalProjected,

    /// Source edge best matching the nearest vertices of both endpoints.
    EdgeVertNearest,
    /// Nearest source edge to the edge midpoint.
    EdgeNearest,
    /// Edge of the nearest source face closest to the edge midpoint.
    EdgePolyNearest,
    /// Source edges hit by rays cast along the edge's normals.
    EdgeInterpNormalProjected,

    /// Corner around the nearest source vertex with the most similar normal.
    CornerNearestCornerNormal,
    /// Corner of the face around the nearest source vertex with the most
    /// similar face normal.
    CornerNearestFaceNormal,
    /// Corner of the nearest source face closest to the hit.
    CornerPolyNearest,
    /// Nearest source face, all its corners interpolated.
    CornerPolyInterpNearest,
    /// Source face hit along the corner normal, interpolated.
    CornerPolyInterpNormalProjected,

    /// Source face nearest to the face center.
    FaceNearest,
    /// Source face hit along the face normal from its center.
    FaceNormal,
    /// Source faces hit by rays sampled over the face, area weighted.
    FacePolyInterpNormalProjected,
}

impl RemapMode {
    /// Every mode, in declaration order.
    pub const ALL: [RemapMode; 19] = [
        RemapMode::Topology,
        RemapMode::VertNearest,
        RemapMode::VertEdgeNearest,
        RemapMode::VertEdgeInterpNearest,
        RemapMode::VertFaceNearest,
        RemapMode::VertPolyInterpNearest,
        RemapMode::VertPolyInterpNormalProjected,
        RemapMode::EdgeVertNearest,
        RemapMode::EdgeNearest,
        RemapMode::EdgePolyNearest,
        RemapMode::EdgeInterpNormalProjected,
        RemapMode::CornerNearestCornerNormal,
        RemapMode::CornerNearestFaceNormal,
        RemapMode::CornerPolyNearest,
        RemapMode::CornerPolyInterpNearest,
        RemapMode::CornerPolyInterpNormalProjected,
        RemapMode::FaceNearest,
        RemapMode::FaceNormal,
        RemapMode::FacePolyInterpNormalProjected,
    ];

    /// The element kind this mode maps, `None` for [`Topology`](Self::Topology).
    pub fn element(self) -> Option<ElementKind> {
        use RemapMode::*;
        match self {
            Topology => None,
            VertNearest
            | VertEdgeNearest
            | VertEdgeInterpNearest
            | VertFaceNearest
            | VertPolyInterpNearest
            | VertPolyInterpNormalProjected => Some(ElementKind::Vertex),
            EdgeVertNearest | EdgeNearest | EdgePolyNearest | EdgeInterpNormalProjected => {
                Some(ElementKind::Edge)
            }
            CornerNearestCornerNormal
            | CornerNearestFaceNormal
            | CornerPolyNearest
            | CornerPolyInterpNearest
            | CornerPolyInterpNormalProjected => Some(ElementKind::Corner),
            FaceNearest | FaceNormal | FacePolyInterpNormalProjected => Some(ElementKind::Face),
        }
    }

    /// Whether this mode can map elements of `kind`.
    pub fn supports(self, kind: ElementKind) -> bool {
        self.element().map_or(true, |k| k == kind)
    }

    /// Command-line name of the mode.
    pub fn name(self) -> &'static str {
        use RemapMode::*;
        match self {
            Topology => "topology",
            VertNearest => "vert-nearest",
            VertEdgeNearest => "vert-edge-nearest",
            VertEdgeInterpNearest => "vert-edge-interp-nearest",
            VertFaceNearest => "vert-face-nearest",
            VertPolyInterpNearest => "vert-poly-interp-nearest",
            VertPolyInterpNormalProjected => "vert-poly-interp-normal-projected",
            EdgeVertNearest => "edge-vert-nearest",
            EdgeNearest => "edge-nearest",
            EdgePolyNearest => "edge-poly-nearest",
            EdgeInterpNormalProjected => "edge-interp-normal-projected",
            CornerNearestCornerNormal => "corner-nearest-corner-normal",
            CornerNearestFaceNormal => "corner-nearest-face-normal",
            CornerPolyNearest => "corner-poly-nearest",
            CornerPolyInterpNearest => "corner-poly-interp-nearest",
            CornerPolyInterpNormalProjected => "corner-poly-interp-normal-projected",
            FaceNearest => "face-nearest",
            FaceNormal => "face-normal",
            FacePolyInterpNormalProjected => "face-poly-interp-normal-projected",
        }
    }
}

impl fmt::Display for RemapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RemapMode {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        RemapMode::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| MeshError::invalid_param("mode", s, "unknown remap mode"))
    }
}

/// Outcome of a remap call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapStatus {
    /// Every destination element was processed (some may have no source).
    Complete,
    /// The mode does not apply to this element kind; every item is empty.
    UnsupportedMode,
}

/// Options shared by all remap entry points.
#[derive(Debug, Clone)]
pub struct RemapOptions {
    /// Maximum distance between a destination element and its source.
    /// Infinite by default.
    pub max_distance: f64,

    /// Thickness of projection rays; 0 casts exact rays.
    pub ray_radius: f64,

    /// Transform from destination space into source space.
    pub space_transform: Option<SpaceTransform>,

    /// Strength of the seam-aware correction for corners, in `[0, 1]`.
    /// 0 disables it.
    pub islands_precision: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,

    /// Where warnings and debug messages go.
    pub diagnostics: Diagnostics,
}

impl Default for RemapOptions {
    fn default() -> Self {
        Self {
            max_distance: f64::INFINITY,
            ray_radius: 0.0,
            space_transform: None,
            islands_precision: 0.0,
            parallel: true,
            diagnostics: Diagnostics::default(),
        }
    }
}

impl RemapOptions {
    /// Create options with the specified maximum distance.
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Create options with the specified ray radius.
    pub fn with_ray_radius(mut self, ray_radius: f64) -> Self {
        self.ray_radius = ray_radius;
        self
    }

    /// Create options with a destination-to-source transform.
    pub fn with_space_transform(mut self, transform: SpaceTransform) -> Self {
        self.space_transform = Some(transform);
        self
    }

    /// Create options with the specified islands precision.
    pub fn with_islands_precision(mut self, precision: f64) -> Self {
        self.islands_precision = precision;
        self
    }

    /// Create options with a custom diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_distance.is_nan() || self.max_distance < 0.0 {
            return Err(MeshError::invalid_param(
                "max_distance",
                self.max_distance,
                "must be non-negative",
            ));
        }
        if !self.ray_radius.is_finite() || self.ray_radius < 0.0 {
            return Err(MeshError::invalid_param(
                "ray_radius",
                self.ray_radius,
                "must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.islands_precision) {
            return Err(MeshError::invalid_param(
                "islands_precision",
                self.islands_precision,
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }

    pub(crate) fn transform(&self) -> Option<&SpaceTransform> {
        self.space_transform.as_ref()
    }

    pub(crate) fn max_distance_sq(&self) -> f64 {
        self.max_distance * self.max_distance
    }

    /// `(radius, weight)` of each ray attempt, widest last.
    pub(crate) fn ray_attempts(&self) -> impl Iterator<Item = (f64, f64)> {
        let attempts = if self.ray_radius > 0.0 {
            APPROXIMATE_RAY_ATTEMPTS
        } else {
            1
        };
        let radius = self.ray_radius;
        std::iter::successors(Some(1.0), |w| Some(w / APPROXIMATE_RAY_FACTOR))
            .take(attempts)
            .map(move |w| (radius / w, w))
    }
}

/// Shared entry checks: parameters, mode support and topology counts.
///
/// Returns `Ok(false)` when the mode does not apply; the map has then been
/// initialized to `len` empty items and a warning emitted.
pub(crate) fn begin(
    kind: ElementKind,
    mode: RemapMode,
    src_len: usize,
    dst_len: usize,
    options: &RemapOptions,
    map: &mut CorrespondenceMap,
) -> Result<bool> {
    options.validate()?;
    map.init(dst_len);
    if !mode.supports(kind) {
        options.diagnostics.warn(&format!(
            "unsupported mesh-to-mesh {kind} mapping mode ({mode})"
        ));
        return Ok(false);
    }
    if mode == RemapMode::Topology && src_len != dst_len {
        return Err(MeshError::TopologyMismatch {
            element: kind,
            expected: src_len,
            found: dst_len,
        });
    }
    Ok(true)
}

/// Identity mapping for [`RemapMode::Topology`].
pub(crate) fn define_topology(map: &mut CorrespondenceMap) {
    for i in 0..map.len() {
        map.define(i, &[i], &[1.0], 0);
    }
}

/// Resolve `len` destination elements, in parallel when `parallel` is set.
///
/// `init` creates the per-thread state (query accumulators, scratch
/// buffers); results come back in element order. Progress is reported after
/// every batch.
pub(crate) fn resolve_batched<S, R, INIT, F>(
    len: usize,
    parallel: bool,
    progress: Option<&progress::Progress>,
    message: &str,
    init: INIT,
    resolve: F,
) -> Vec<R>
where
    R: Send,
    INIT: Fn() -> S + Sync + Send,
    F: Fn(&mut S, usize) -> R + Sync + Send,
{
    let mut out = Vec::with_capacity(len);
    let mut state: Option<S> = None;
    let mut start = 0;
    while start < len {
        let end = (start + BATCH_SIZE).min(len);
        if parallel {
            out.par_extend((start..end).into_par_iter().map_init(&init, &resolve));
        } else {
            let state = state.get_or_insert_with(&init);
            out.extend((start..end).map(|i| resolve(state, i)));
        }
        if let Some(p) = progress {
            p.report(end, len, message);
        }
        start = end;
    }
    out
}
