//!
//! # Spatial Index
//!
//! An arena of [FlatShape]s addressed by stable [ShapeKey] handles,
//! plus an R-tree over their bounding boxes.
//!

// Crates.io
use rstar::{RTree, RTreeObject, AABB};
use slotmap::{new_key_type, SlotMap};

// Workspace Imports
use fill21raw::{clip, BoundBox, FlatShape, Int, Point};

new_key_type! {
    /// Handle to a [FlatShape] in a [SpatialIndex]
    pub struct ShapeKey;
}

/// R-tree entry: a handle and its bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    key: ShapeKey,
    lo: [Int; 2],
    hi: [Int; 2],
}
impl RTreeObject for Entry {
    type Envelope = AABB<[Int; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.lo, self.hi)
    }
}
impl Entry {
    fn new(key: ShapeKey, bbox: &BoundBox) -> Self {
        Self {
            key,
            lo: [bbox.p0.x, bbox.p0.y],
            hi: [bbox.p1.x, bbox.p1.y],
        }
    }
}

/// Envelope of `region`
fn envelope(region: &BoundBox) -> AABB<[Int; 2]> {
    AABB::from_corners([region.p0.x, region.p0.y], [region.p1.x, region.p1.y])
}

///
/// # Spatial Index
///
/// Shapes are never removed, so handles remain valid for the index's lifetime,
/// including across later insertions.
///
#[derive(Debug)]
pub struct SpatialIndex {
    shapes: SlotMap<ShapeKey, FlatShape>,
    tree: RTree<Entry>,
}
impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
impl SpatialIndex {
    /// Create a new, empty index
    pub fn new() -> Self {
        Self {
            shapes: SlotMap::with_key(),
            tree: RTree::new(),
        }
    }
    /// Build from `shapes`, bulk-loading the tree
    pub fn build(shapes: impl IntoIterator<Item = FlatShape>) -> Self {
        let mut arena = SlotMap::with_key();
        let mut entries = Vec::new();
        for shape in shapes {
            let bbox = shape.bbox.clone();
            if bbox.is_empty() {
                continue;
            }
            let key = arena.insert(shape);
            entries.push(Entry::new(key, &bbox));
        }
        Self {
            shapes: arena,
            tree: RTree::bulk_load(entries),
        }
    }
    /// Add `shape`, returning its handle
    pub fn insert(&mut self, shape: FlatShape) -> ShapeKey {
        let bbox = shape.bbox.clone();
        let key = self.shapes.insert(shape);
        if !bbox.is_empty() {
            self.tree.insert(Entry::new(key, &bbox));
        }
        key
    }
    pub fn get(&self, key: ShapeKey) -> Option<&FlatShape> {
        self.shapes.get(key)
    }
    pub fn len(&self) -> usize {
        self.shapes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
    /// Shapes whose bounding boxes intersect `region`, including those which merely touch it.
    /// A superset of [SpatialIndex::query]. Ordered by handle.
    pub fn candidates(&self, region: &BoundBox) -> Vec<ShapeKey> {
        if region.is_empty() {
            return Vec::new();
        }
        let mut keys: Vec<ShapeKey> = self
            .tree
            .locate_in_envelope_intersecting(&envelope(region))
            .map(|e| e.key)
            .collect();
        keys.sort();
        keys
    }
    /// Shapes overlapping `region` with positive area. Ordered by handle.
    pub fn query(&self, region: &BoundBox) -> Vec<ShapeKey> {
        self.query_by(region, |_| true)
    }
    /// Shapes satisfying `pred` and overlapping `region` with positive area.
    /// The (cheaper) predicate is evaluated before the exact geometric test.
    pub fn query_by(&self, region: &BoundBox, pred: impl Fn(&FlatShape) -> bool) -> Vec<ShapeKey> {
        self.candidates(region)
            .into_iter()
            .filter(|k| match self.shapes.get(*k) {
                Some(s) => pred(s) && clip::overlaps_rect(&s.poly.points, region),
                None => false,
            })
            .collect()
    }
    /// Whether any shape satisfying `pred` overlaps `region` with positive area
    pub fn any_overlap(&self, region: &BoundBox, pred: impl Fn(&FlatShape) -> bool) -> bool {
        if region.is_empty() {
            return false;
        }
        self.tree
            .locate_in_envelope_intersecting(&envelope(region))
            .filter_map(|e| self.shapes.get(e.key))
            .any(|s| pred(s) && clip::overlaps_rect(&s.poly.points, region))
    }
    /// Minimum Euclidean distance from `shape` to any indexed shape within `region`.
    /// Zero where they touch or overlap, and infinite when `region` holds no shapes.
    pub fn min_distance(&self, shape: &FlatShape, region: &BoundBox) -> f64 {
        self.min_distance_by(shape, region, |_| true)
    }
    /// [SpatialIndex::min_distance], restricted to shapes satisfying `pred`
    pub fn min_distance_by(
        &self,
        shape: &FlatShape,
        region: &BoundBox,
        pred: impl Fn(&FlatShape) -> bool,
    ) -> f64 {
        self.candidates(region)
            .into_iter()
            .filter_map(|k| self.shapes.get(k))
            .filter(|s| pred(s))
            .map(|s| clip::distance(&shape.poly.points, &s.poly.points))
            .fold(f64::INFINITY, f64::min)
    }
    /// Polygon points of the shapes at `keys`
    pub fn polys<'a>(&'a self, keys: &'a [ShapeKey]) -> impl Iterator<Item = &'a [Point]> {
        keys.iter()
            .filter_map(move |k| self.shapes.get(*k))
            .map(|s| s.poly.points.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fill21raw::{BoundBoxTrait, Layer, Polygon, Rect, ShapeTrait, Tag};

    fn rect(layer: Layer, tag: Tag, x0: Int, y0: Int, x1: Int, y1: Int) -> FlatShape {
        let r = Rect::new(Point::new(x0, y0), Point::new(x1, y1));
        let poly: Polygon = r.to_polys().remove(0);
        FlatShape {
            layer,
            tag,
            bbox: poly.bbox(),
            poly,
        }
    }

    #[test]
    fn query_is_exact() {
        let m1 = Layer::new(1, 0);
        let index = SpatialIndex::build(vec![
            rect(m1, Tag::Design, 0, 0, 10, 10),
            rect(m1, Tag::Design, 20, 0, 30, 10),
        ]);
        assert_eq!(index.len(), 2);
        // Touching at x=10 counts as a candidate, but not an overlap
        let region = BoundBox::new(10, 0, 20, 10);
        assert_eq!(index.candidates(&region).len(), 2);
        assert_eq!(index.query(&region).len(), 0);
        assert_eq!(index.query(&BoundBox::new(5, 5, 25, 6)).len(), 2);
        assert!(index.query(&BoundBox::empty()).is_empty());
    }

    #[test]
    fn triangles_filter_false_positives() {
        let m1 = Layer::new(1, 0);
        let points = vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(0, 100),
        ];
        let poly = Polygon { points };
        let tri = FlatShape {
            layer: m1,
            tag: Tag::Design,
            bbox: poly.bbox(),
            poly,
        };
        let index = SpatialIndex::build(vec![tri]);
        // Inside the bounding box, beyond the hypotenuse
        assert_eq!(index.candidates(&BoundBox::new(80, 80, 90, 90)).len(), 1);
        assert!(index.query(&BoundBox::new(80, 80, 90, 90)).is_empty());
        assert_eq!(index.query(&BoundBox::new(10, 10, 20, 20)).len(), 1);
    }

    #[test]
    fn inserts_keep_handles() {
        let m1 = Layer::new(1, 0);
        let mut index = SpatialIndex::build(vec![rect(m1, Tag::Design, 0, 0, 10, 10)]);
        let before = index.query(&BoundBox::new(0, 0, 100, 100));
        let key = index.insert(rect(m1, Tag::Fill, 50, 50, 60, 60));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(before[0]).map(|s| s.tag), Some(Tag::Design));
        assert_eq!(index.get(key).map(|s| s.tag), Some(Tag::Fill));
        let fills = index.query_by(&BoundBox::new(0, 0, 100, 100), |s| s.tag == Tag::Fill);
        assert_eq!(fills, vec![key]);
        assert!(index.any_overlap(&BoundBox::new(55, 55, 70, 70), |s| s.tag == Tag::Fill));
        assert!(!index.any_overlap(&BoundBox::new(55, 55, 70, 70), |s| s.tag == Tag::Design));
    }

    #[test]
    fn distances() {
        let m1 = Layer::new(1, 0);
        let index = SpatialIndex::build(vec![
            rect(m1, Tag::Design, 0, 0, 10, 10),
            rect(m1, Tag::Design, 13, 40, 20, 50),
        ]);
        let probe = rect(m1, Tag::Fill, 13, 14, 20, 20);
        let d = index.min_distance(&probe, &BoundBox::new(-100, -100, 100, 100));
        assert!((d - 5.0).abs() < 1e-9);
        let d = index.min_distance(&probe, &BoundBox::new(0, 30, 100, 100));
        assert!((d - 20.0).abs() < 1e-9);
        let d = index.min_distance(&probe, &BoundBox::new(500, 500, 600, 600));
        assert!(d.is_infinite());
        let touching = rect(m1, Tag::Fill, 10, 0, 20, 10);
        assert_eq!(index.min_distance(&touching, &touching.bbox.expanded(1)), 0.0);
    }
}
