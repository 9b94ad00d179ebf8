//! Grouped one-to-many adjacency maps.
//!
//! Every adjacency relation of a [`PolyMesh`](super::PolyMesh) (vertex to
//! edges, edge to faces, ...) is stored as a flat index array split into
//! groups by an offsets array, so a lookup is a single slice.

/// A compact one-to-many map: group `i` owns `indices[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedMap {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl GroupedMap {
    /// Build a map with `groups` groups from `(group, value)` pairs.
    ///
    /// Values keep the order in which `pairs` yields them within each group.
    pub fn from_pairs<I>(groups: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)> + Clone,
    {
        let mut counts = vec![0usize; groups + 1];
        for (group, _) in pairs.clone() {
            counts[group + 1] += 1;
        }
        for i in 0..groups {
            counts[i + 1] += counts[i];
        }
        let offsets = counts;

        let mut fill = offsets.clone();
        let mut indices = vec![0usize; offsets[groups]];
        for (group, value) in pairs {
            indices[fill[group]] = value;
            fill[group] += 1;
        }

        Self { offsets, indices }
    }

    /// Number of groups.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Whether the map has no groups.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The members of group `i`.
    #[inline]
    pub fn get(&self, i: usize) -> &[usize] {
        &self.indices[self.offsets[i]..self.offsets[i + 1]]
    }
}

impl std::ops::Index<usize> for GroupedMap {
    type Output = [usize];

    fn index(&self, i: usize) -> &[usize] {
        self.get(i)
    }
}
