//!
//! # Rectangular Bounding Boxes and Associated Trait
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use crate::{
    geom::{Point, Polygon, Rect, Shape, ShapeTrait},
    Int,
};

/// # Rectangular Bounding Box
///
/// Points `p0` and `p1` represent opposite corners of a bounding rectangle.
/// `p0` is always closest to negative-infinity, in both x and y,
/// and `p1` is always closest to positive-infinity.
///
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct BoundBox {
    pub p0: Point,
    pub p1: Point,
}
impl BoundBox {
    /// Create a new [BoundBox] from corner coordinates, in any order
    pub fn new(x0: Int, y0: Int, x1: Int, y1: Int) -> Self {
        Self::from_points(Point::new(x0, y0), Point::new(x1, y1))
    }
    /// Create a new [BoundBox] from a single [Point].
    /// The resultant [BoundBox] comprises solely the point, having zero area.
    pub fn from_point(pt: Point) -> Self {
        Self { p0: pt, p1: pt }
    }
    /// Create a new [BoundBox] from two points
    pub fn from_points(p0: Point, p1: Point) -> Self {
        Self {
            p0: Point::new(p0.x.min(p1.x), p0.y.min(p1.y)),
            p1: Point::new(p0.x.max(p1.x), p0.y.max(p1.y)),
        }
    }
    /// Create an empty, otherwise invalid [BoundBox]
    pub fn empty() -> Self {
        Self {
            p0: Point::new(Int::MAX, Int::MAX),
            p1: Point::new(Int::MIN, Int::MIN),
        }
    }
    /// Create a [BoundBox] covering all of layout-space
    pub fn everything() -> Self {
        Self {
            p0: Point::new(Int::MIN, Int::MIN),
            p1: Point::new(Int::MAX, Int::MAX),
        }
    }
    /// Boolean indication of whether a box is empty
    pub fn is_empty(&self) -> bool {
        self.p0.x > self.p1.x || self.p0.y > self.p1.y
    }
    /// Boolean indication of whether [Point] `pt` lies inside out box.
    pub fn contains(&self, pt: &Point) -> bool {
        self.p0.x <= pt.x && self.p1.x >= pt.x && self.p0.y <= pt.y && self.p1.y >= pt.y
    }
    /// Boolean indication of whether we share any point with `other`, including along edges
    pub fn intersects(&self, other: &BoundBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.p0.x <= other.p1.x
            && other.p0.x <= self.p1.x
            && self.p0.y <= other.p1.y
            && other.p0.y <= self.p1.y
    }
    /// Boolean indication of whether we overlap `other` with positive area.
    /// Boxes which merely abut do not overlap.
    pub fn overlaps(&self, other: &BoundBox) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.p0.x < other.p1.x
            && other.p0.x < self.p1.x
            && self.p0.y < other.p1.y
            && other.p0.y < self.p1.y
    }
    /// Expand an existing [BoundBox] in all directions by `delta`
    pub fn expand(&mut self, delta: Int) {
        self.p0.x -= delta;
        self.p0.y -= delta;
        self.p1.x += delta;
        self.p1.y += delta;
    }
    /// Create a copy, expanded in all directions by `delta`
    pub fn expanded(&self, delta: Int) -> Self {
        let mut b = self.clone();
        b.expand(delta);
        b
    }
    /// Get the box's size as an (x,y) tuple
    pub fn size(&self) -> (Int, Int) {
        (self.p1.x - self.p0.x, self.p1.y - self.p0.y)
    }
    /// Area, zero for empty boxes
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let (w, h) = self.size();
        w as f64 * h as f64
    }
}

///
/// # Bounding Box Trait
///
/// Methods for interacting with [BoundBox]s.
/// Implementations for [Point]s, [Shape]s, and [BoundBox]s
/// enable geometric transformations such as union and intersection.
///
pub trait BoundBoxTrait {
    /// Compute a rectangular bounding box around the implementing type.
    fn bbox(&self) -> BoundBox;
    /// Compute the intersection with rectangular bounding box `bbox`.
    /// Creates and returns a new [BoundBox].
    fn intersection(&self, bbox: &BoundBox) -> BoundBox {
        let own = self.bbox();
        let pmin = Point::new(own.p0.x.max(bbox.p0.x), own.p0.y.max(bbox.p0.y));
        let pmax = Point::new(own.p1.x.min(bbox.p1.x), own.p1.y.min(bbox.p1.y));
        if pmin.x > pmax.x || pmin.y > pmax.y {
            return BoundBox::empty();
        }
        BoundBox { p0: pmin, p1: pmax }
    }
    /// Compute the union with rectangular bounding box `bbox`.
    /// Creates and returns a new [BoundBox].
    fn union(&self, bbox: &BoundBox) -> BoundBox {
        let own = self.bbox();
        if own.is_empty() {
            return bbox.clone();
        }
        if bbox.is_empty() {
            return own;
        }
        BoundBox {
            p0: Point::new(own.p0.x.min(bbox.p0.x), own.p0.y.min(bbox.p0.y)),
            p1: Point::new(own.p1.x.max(bbox.p1.x), own.p1.y.max(bbox.p1.y)),
        }
    }
}

impl BoundBoxTrait for BoundBox {
    fn bbox(&self) -> BoundBox {
        self.clone()
    }
}
impl BoundBoxTrait for Point {
    fn bbox(&self) -> BoundBox {
        BoundBox::from_point(*self)
    }
}
impl BoundBoxTrait for [Point] {
    fn bbox(&self) -> BoundBox {
        let mut bbox = BoundBox::empty();
        for pt in self {
            bbox.p0.x = bbox.p0.x.min(pt.x);
            bbox.p0.y = bbox.p0.y.min(pt.y);
            bbox.p1.x = bbox.p1.x.max(pt.x);
            bbox.p1.y = bbox.p1.y.max(pt.y);
        }
        bbox
    }
}
impl BoundBoxTrait for Rect {
    fn bbox(&self) -> BoundBox {
        BoundBox::from_points(self.p0, self.p1)
    }
}
impl BoundBoxTrait for Polygon {
    fn bbox(&self) -> BoundBox {
        self.points.bbox()
    }
}
impl BoundBoxTrait for Shape {
    fn bbox(&self) -> BoundBox {
        match self {
            Shape::Rect(r) => r.bbox(),
            Shape::Polygon(p) => p.bbox(),
            Shape::Path(p) => {
                let mut bbox = BoundBox::empty();
                for poly in p.to_polys() {
                    bbox = bbox.union(&poly.bbox());
                }
                bbox
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_boxes() {
        let e = BoundBox::empty();
        assert!(e.is_empty());
        assert_eq!(e.area(), 0.0);
        let b = BoundBox::new(10, 10, 0, 0);
        assert_eq!(b.p0, Point::new(0, 0));
        assert_eq!(e.union(&b), b);
        assert_eq!(b.union(&e), b);
        assert!(b.intersection(&e).is_empty());
        assert!(!b.intersects(&e));
    }
    #[test]
    fn abutting_boxes_intersect_without_overlap() {
        let a = BoundBox::new(0, 0, 10, 10);
        let b = BoundBox::new(10, 0, 20, 10);
        assert!(a.intersects(&b));
        assert!(!a.overlaps(&b));
        assert_eq!(a.intersection(&b), BoundBox::new(10, 0, 10, 10));
        assert!(a.overlaps(&b.expanded(1)));
        assert_eq!(a.union(&b).area(), 200.0);
    }
}
