// ===========================================================================
// Spatial indexes over points and polyline pieces (R*-trees)
// ===========================================================================
use geo::{Coord, LineString};
use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;

pub type IndexedPoint<T> = GeomWithData<[f64; 2], T>;
pub type IndexedPiece<T> = GeomWithData<Line<[f64; 2]>, T>;

fn key(c: Coord<f64>) -> [f64; 2] {
    [c.x, c.y]
}

/// Point index supporting nearest-neighbour and radius queries.
pub struct PointIndex<T> {
    tree: RTree<IndexedPoint<T>>,
}

impl<T: Clone + PartialEq> PointIndex<T> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn bulk_load(items: impl IntoIterator<Item = (Coord<f64>, T)>) -> Self {
        let entries: Vec<IndexedPoint<T>> = items
            .into_iter()
            .map(|(c, data)| GeomWithData::new(key(c), data))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, c: Coord<f64>, data: T) {
        self.tree.insert(GeomWithData::new(key(c), data));
    }

    pub fn remove(&mut self, c: Coord<f64>, data: T) -> bool {
        self.tree.remove(&GeomWithData::new(key(c), data)).is_some()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Nearest entry and its distance.
    pub fn nearest(&self, c: Coord<f64>) -> Option<(&T, f64)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&key(c))
            .next()
            .map(|(entry, d2)| (&entry.data, d2.sqrt()))
    }

    /// Nearest entry accepted by `eligible`, walking outward from `c`.
    pub fn nearest_where(
        &self,
        c: Coord<f64>,
        eligible: impl Fn(&T) -> bool,
    ) -> Option<(&T, f64)> {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&key(c))
            .find(|(entry, _)| eligible(&entry.data))
            .map(|(entry, d2)| (&entry.data, d2.sqrt()))
    }

    /// All entries within `radius` of `c`, with their coordinates.
    pub fn within(&self, c: Coord<f64>, radius: f64) -> Vec<(Coord<f64>, &T)> {
        self.tree
            .locate_within_distance(key(c), radius * radius)
            .map(|entry| {
                let [x, y] = *entry.geom();
                (Coord { x, y }, &entry.data)
            })
            .collect()
    }
}

impl<T: Clone + PartialEq> Default for PointIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Index over the straight pieces of polylines, each tagged with its owner.
pub struct SegmentIndex<T> {
    tree: RTree<IndexedPiece<T>>,
}

impl<T: Clone + PartialEq> SegmentIndex<T> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    fn pieces(line: &LineString<f64>, data: &T) -> Vec<IndexedPiece<T>> {
        line.0
            .windows(2)
            .map(|w| GeomWithData::new(Line::new(key(w[0]), key(w[1])), data.clone()))
            .collect()
    }

    pub fn insert_line(&mut self, line: &LineString<f64>, data: T) {
        for piece in Self::pieces(line, &data) {
            self.tree.insert(piece);
        }
    }

    pub fn remove_line(&mut self, line: &LineString<f64>, data: T) {
        for piece in Self::pieces(line, &data) {
            self.tree.remove(&piece);
        }
    }

    /// Owner of the nearest piece within `max_distance` that `eligible` accepts.
    pub fn nearest_where(
        &self,
        c: Coord<f64>,
        max_distance: Option<f64>,
        eligible: impl Fn(&T) -> bool,
    ) -> Option<(&T, f64)> {
        let limit_2 = max_distance.map(|d| d * d);
        self.tree
            .nearest_neighbor_iter_with_distance_2(&key(c))
            .take_while(|(_, d2)| limit_2.is_none_or(|l| *d2 <= l))
            .find(|(piece, _)| eligible(&piece.data))
            .map(|(piece, d2)| (&piece.data, d2.sqrt()))
    }
}

impl<T: Clone + PartialEq> Default for SegmentIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
