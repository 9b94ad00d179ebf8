//! Source mesh islands for corner remapping.
//!
//! An island is a set of faces that may be interpolated across freely; corner
//! remapping never blends sources from two islands within one destination
//! face. Islands come from an [`IslandClassifier`], typically
//! [`SeamIslands`].

use crate::error::{MeshError, Result};
use crate::mesh::PolyMesh;

/// One island: its faces and the seam edges running through its interior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Island {
    /// Faces of the island, in ascending order.
    pub faces: Vec<usize>,
    /// Seam edges with the island on both sides.
    pub inner_cuts: Vec<usize>,
}

/// Partition of a mesh's faces (and therefore corners) into islands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IslandStore {
    items_to_islands: Vec<usize>,
    face_islands: Vec<usize>,
    islands: Vec<Island>,
}

impl IslandStore {
    /// Build a store from the island of every face of `mesh`.
    ///
    /// Island ids are used as given; there are `max id + 1` islands. Inner
    /// cuts are the seam edges used by at least two corners of one island.
    ///
    /// # Errors
    ///
    /// [`MeshError::InvalidAttributeLength`] if `face_islands` does not have
    /// one entry per face.
    pub fn from_face_islands(mesh: &PolyMesh, face_islands: Vec<usize>) -> Result<Self> {
        if face_islands.len() != mesh.num_faces() {
            return Err(MeshError::InvalidAttributeLength {
                name: "face_islands",
                expected: mesh.num_faces(),
                found: face_islands.len(),
            });
        }

        let count = face_islands.iter().max().map_or(0, |&m| m + 1);
        let mut islands = vec![Island::default(); count];
        let mut items_to_islands = vec![0; mesh.num_corners()];
        for (f, &island) in face_islands.iter().enumerate() {
            islands[island].faces.push(f);
            for c in mesh.face_corners(f) {
                items_to_islands[c] = island;
            }
        }

        let seams = mesh.seams();
        let edge_to_faces = mesh.edge_to_faces();
        for e in (0..mesh.num_edges()).filter(|&e| seams[e]) {
            let faces = &edge_to_faces[e];
            for (i, &f) in faces.iter().enumerate() {
                let island = face_islands[f];
                // Report each edge once per island, from its first face there.
                let first = faces[..i].iter().all(|&g| face_islands[g] != island);
                let shared = faces[i + 1..].iter().any(|&g| face_islands[g] == island);
                if first && shared {
                    islands[island].inner_cuts.push(e);
                }
            }
        }

        Ok(Self {
            items_to_islands,
            face_islands,
            islands,
        })
    }

    /// Number of islands.
    #[inline]
    pub fn len(&self) -> usize {
        self.islands.len()
    }

    /// Whether there are no islands.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.islands.is_empty()
    }

    /// Island `i`.
    #[inline]
    pub fn island(&self, i: usize) -> &Island {
        &self.islands[i]
    }

    /// All islands.
    #[inline]
    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Island of corner `c`.
    #[inline]
    pub fn island_of_corner(&self, c: usize) -> usize {
        self.items_to_islands[c]
    }

    /// Island of face `f`.
    #[inline]
    pub fn island_of_face(&self, f: usize) -> usize {
        self.face_islands[f]
    }

    /// Island of every corner.
    #[inline]
    pub fn items_to_islands(&self) -> &[usize] {
        &self.items_to_islands
    }
}

/// Splits a source mesh into islands.
///
/// Returning `None` means "no islands": the whole mesh is then treated as a
/// single island. Closures `Fn(&PolyMesh) -> Option<IslandStore>` implement
/// this trait.
pub trait IslandClassifier: Send + Sync {
    /// Classify the faces of `mesh`.
    fn classify(&self, mesh: &PolyMesh) -> Option<IslandStore>;
}

impl<F> IslandClassifier for F
where
    F: Fn(&PolyMesh) -> Option<IslandStore> + Send + Sync,
{
    fn classify(&self, mesh: &PolyMesh) -> Option<IslandStore> {
        self(mesh)
    }
}

/// Islands bounded by seam edges.
///
/// Faces sharing a non-seam edge belong to the same island. Islands are
/// numbered in order of their lowest face.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeamIslands;

impl IslandClassifier for SeamIslands {
    fn classify(&self, mesh: &PolyMesh) -> Option<IslandStore> {
        if mesh.num_faces() == 0 {
            return None;
        }

        let seams = mesh.seams();
        let edge_to_faces = mesh.edge_to_faces();
        let mut face_islands = vec![usize::MAX; mesh.num_faces()];
        let mut count = 0;
        let mut stack = Vec::new();

        for start in 0..mesh.num_faces() {
            if face_islands[start] != usize::MAX {
                continue;
            }
            face_islands[start] = count;
            stack.push(start);
            while let Some(f) = stack.pop() {
                for &e in mesh.face_edges(f) {
                    if seams[e] {
                        continue;
                    }
                    for &g in &edge_to_faces[e] {
                        if face_islands[g] == usize::MAX {
                            face_islands[g] = count;
                            stack.push(g);
                        }
                    }
                }
            }
            count += 1;
        }

        IslandStore::from_face_islands(mesh, face_islands).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;

    #[test]
    fn test_seam_splits_strip() {
        let strip = fixtures::seam_strip(4);
        let store = SeamIslands.classify(&strip).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.island(0).faces, vec![0, 1]);
        assert_eq!(store.island(1).faces, vec![2, 3]);
        assert!(store.island(0).inner_cuts.is_empty());
        assert_eq!(store.island_of_face(3), 1);
        for c in strip.face_corners(2) {
            assert_eq!(store.island_of_corner(c), 1);
        }
    }

    #[test]
    fn test_partial_seam_is_an_inner_cut() {
        // A seam that does not reach the border leaves one island.
        let mut grid = fixtures::grid(2, 2);
        assert!(grid.mark_seam(1, 4));
        let cut = grid.find_edge(1, 4).unwrap();

        let store = SeamIslands.classify(&grid).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.island(0).faces, vec![0, 1, 2, 3]);
        assert_eq!(store.island(0).inner_cuts, vec![cut]);
    }

    #[test]
    fn test_no_faces_means_no_islands() {
        let cloud = PolyMesh::from_points(vec![nalgebra::Point3::origin()]);
        assert!(SeamIslands.classify(&cloud).is_none());
    }

    #[test]
    fn test_closure_classifier() {
        let grid = fixtures::grid(3, 1);
        let by_parity = |mesh: &PolyMesh| {
            IslandStore::from_face_islands(mesh, (0..mesh.num_faces()).map(|f| f % 2).collect()).ok()
        };
        let store = by_parity.classify(&grid).unwrap();
        assert_eq!(store.island(0).faces, vec![0, 2]);
        assert_eq!(store.island(1).faces, vec![1]);

        let err = IslandStore::from_face_islands(&grid, vec![0]).unwrap_err();
        assert!(matches!(err, MeshError::InvalidAttributeLength { expected: 3, found: 1, .. }));
    }
}
