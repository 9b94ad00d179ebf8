//! Weighted correspondence map: one weighted source list per destination element.

/// Weighted sources resolved for one destination element.
///
/// Produced by the remappers (possibly on worker threads) and then written
/// into a [`CorrespondenceMap`] in destination order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ItemSources {
    pub(crate) indices: Vec<usize>,
    pub(crate) weights: Vec<f64>,
    pub(crate) island: usize,
}

impl ItemSources {
    /// A miss: no source, island 0.
    pub(crate) fn invalid() -> Self {
        Self::default()
    }

    /// A miss attributed to `island`.
    pub(crate) fn invalid_in(island: usize) -> Self {
        Self {
            island,
            ..Self::default()
        }
    }

    /// A single source with full weight.
    pub(crate) fn single(index: usize, island: usize) -> Self {
        Self {
            indices: vec![index],
            weights: vec![1.0],
            island,
        }
    }

    /// Copy `indices` and `weights` out of a scratch buffer.
    pub(crate) fn weighted(indices: &[usize], weights: &[f64], island: usize) -> Self {
        Self {
            indices: indices.to_vec(),
            weights: weights.to_vec(),
            island,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Span {
    start: usize,
    len: usize,
    island: usize,
}

/// Read-only view of one map item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceItem<'a> {
    /// Source element indices.
    pub sources: &'a [usize],
    /// Weight of each source; sums to 1 when non-empty.
    pub weights: &'a [f64],
    /// Source island the item resolved to (corner remapping only, 0 otherwise).
    pub island: usize,
}

impl<'a> CorrespondenceItem<'a> {
    /// Whether no source was found.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of sources.
    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// `(source index, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        self.sources.iter().copied().zip(self.weights.iter().copied())
    }

    /// Weighted sum of a per-source attribute.
    ///
    /// Returns `None` for an empty item.
    ///
    /// ```
    /// use meshpair::remap::CorrespondenceMap;
    ///
    /// let mut map = CorrespondenceMap::new(1);
    /// map.define(0, &[0, 1], &[0.25, 0.75], 0);
    /// let values = [4.0, 8.0];
    /// assert_eq!(map.item(0).interpolate(|i| values[i]), Some(7.0));
    /// ```
    pub fn interpolate<T, F>(&self, mut value: F) -> Option<T>
    where
        T: std::ops::Mul<f64, Output = T> + std::ops::Add<Output = T>,
        F: FnMut(usize) -> T,
    {
        self.iter()
            .map(|(i, w)| value(i) * w)
            .reduce(|acc, v| acc + v)
    }
}

/// Per-destination-element weighted source lists.
///
/// All payloads live in two flat vectors owned by the map; defining an item
/// appends its sources and points the item at them. Redefining an item
/// leaves its previous payload unreferenced until the next
/// [`init`](Self::init).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceMap {
    items: Vec<Span>,
    sources: Vec<usize>,
    weights: Vec<f64>,
}

impl CorrespondenceMap {
    /// A map with `len` empty items.
    pub fn new(len: usize) -> Self {
        let mut map = Self::default();
        map.init(len);
        map
    }

    /// Discard all content and size the map for `len` items.
    pub fn init(&mut self, len: usize) {
        self.items.clear();
        self.items.resize(len, Span::default());
        self.sources.clear();
        self.weights.clear();
    }

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the map has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Set item `index` to the given sources.
    ///
    /// Weights are stored as given: callers pass normalized weights (checked
    /// in debug builds only). Empty `sources` define a miss.
    pub fn define(&mut self, index: usize, sources: &[usize], weights: &[f64], island: usize) {
        debug_assert_eq!(sources.len(), weights.len());
        debug_assert!(
            sources.is_empty() || (weights.iter().sum::<f64>() - 1.0).abs() < 1e-5,
            "weights of item {index} do not sum to 1"
        );
        let start = self.sources.len();
        self.sources.extend_from_slice(sources);
        self.weights.extend_from_slice(weights);
        self.items[index] = Span {
            start,
            len: sources.len(),
            island,
        };
    }

    /// Set item `index` to "no source".
    #[inline]
    pub fn define_invalid(&mut self, index: usize) {
        self.items[index] = Span::default();
    }

    pub(crate) fn define_item(&mut self, index: usize, item: &ItemSources) {
        self.define(index, &item.indices, &item.weights, item.island);
    }

    /// Write resolved items in order, starting at item 0.
    pub(crate) fn define_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = ItemSources>,
    {
        for (index, item) in items.into_iter().enumerate() {
            self.define_item(index, &item);
        }
    }

    /// Item `index`.
    pub fn item(&self, index: usize) -> CorrespondenceItem<'_> {
        let span = self.items[index];
        CorrespondenceItem {
            sources: &self.sources[span.start..span.start + span.len],
            weights: &self.weights[span.start..span.start + span.len],
            island: span.island,
        }
    }

    /// All items in destination order.
    pub fn iter(&self) -> impl Iterator<Item = CorrespondenceItem<'_>> + '_ {
        (0..self.len()).map(move |i| self.item(i))
    }

    /// Number of items with at least one source.
    pub fn valid_count(&self) -> usize {
        self.items.iter().filter(|s| s.len > 0).count()
    }
}
