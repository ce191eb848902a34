//!
//! # Geometry Module
//!
//! Defines the core geometric types including [Point], [Shape], and [Transform],
//! and their core operations.
//!

// Crates.io
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

// Local imports
use crate::{
    bbox::{BoundBox, BoundBoxTrait},
    clip, Int,
};

/// # Point in two-dimensional layout-space
#[derive(
    Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Point {
    pub x: Int,
    pub y: Int,
}
impl Point {
    /// Create a new [Point] from (x,y) coordinates
    pub fn new(x: Int, y: Int) -> Self {
        Self { x, y }
    }
    /// Create a new point shifted by `x` in the x-dimension and by `y` in the y-dimension
    pub fn shift(&self, p: &Point) -> Point {
        Point {
            x: p.x + self.x,
            y: p.y + self.y,
        }
    }
    /// Create a new [Point], transformed from our original location by `transform`.
    /// Coordinate transforms are applied in floating-point format,
    /// largely for rotations, and then rounded to the nearest integer.
    pub fn transform(&self, trans: &Transform) -> Point {
        let xf = self.x as f64;
        let yf = self.y as f64;
        let x = trans.a[0][0] * xf + trans.a[0][1] * yf + trans.b[0];
        let y = trans.a[1][0] * xf + trans.a[1][1] * yf + trans.b[1];
        Self {
            x: x.round() as Int,
            y: y.round() as Int,
        }
    }
}

/// # Path End Styles
/// GDSII `PATHTYPE`s 0, 1, 2 and 4 respectively.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PathEnds {
    /// Square ends, flush with the end points
    #[default]
    Flush,
    /// Round ends. Approximated as [PathEnds::HalfWidth] for area purposes.
    Round,
    /// Square ends, extended by half the width
    HalfWidth,
    /// Square ends, with explicit extensions at each end
    Custom { begin: Int, end: Int },
}
impl PathEnds {
    /// Extensions beyond the (first, last) points, for a path of `width`
    pub fn extensions(&self, width: Int) -> (f64, f64) {
        let half = width as f64 / 2.0;
        match self {
            PathEnds::Flush => (0.0, 0.0),
            PathEnds::Round | PathEnds::HalfWidth => (half, half),
            PathEnds::Custom { begin, end } => (*begin as f64, *end as f64),
        }
    }
}

/// # Path
///
/// Open-ended geometric path with non-zero width.
/// Primarily consists of a series of ordered [Point]s.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Path {
    pub points: Vec<Point>,
    pub width: Int,
    #[serde(default)]
    pub ends: PathEnds,
}
/// # Polygon
///
/// Closed n-sided polygon with arbitrary number of vertices.
/// Primarily consists of a series of ordered [Point]s.
///
/// Closure from the last point back to the first is implied;
/// the initial point need not be repeated at the end.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Polygon {
    pub points: Vec<Point>,
}
impl Polygon {
    /// Enclosed area. Always non-negative, regardless of orientation.
    pub fn area(&self) -> f64 {
        clip::area(&self.points).abs()
    }
    /// Our [BoundBox], if we are an axis-aligned rectangle
    pub fn as_rect(&self) -> Option<BoundBox> {
        clip::rect_of(&self.points)
    }
}
/// # Rectangle
///
/// Axis-aligned rectangle, specified by two opposite corners.
/// [Rect::new] orders them such that `p0` is the lower-left and `p1` the upper-right.
///
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub p0: Point,
    pub p1: Point,
}
impl Rect {
    /// Create a new [Rect] from any two opposite corners
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            p0: Point::new(a.x.min(b.x), a.y.min(b.y)),
            p1: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }
    /// Calculate our center-point
    pub fn center(&self) -> Point {
        Point::new((self.p0.x + self.p1.x) / 2, (self.p0.y + self.p1.y) / 2)
    }
    pub fn width(&self) -> Int {
        self.p1.x - self.p0.x
    }
    pub fn height(&self) -> Int {
        self.p1.y - self.p0.y
    }
}
impl From<BoundBox> for Rect {
    fn from(b: BoundBox) -> Self {
        Self::new(b.p0, b.p1)
    }
}

/// # Shape
///
/// The primary geometric primitive comprising raw layout.
/// Variants include [Rect], [Polygon], and [Path].
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[enum_dispatch(ShapeTrait)]
pub enum Shape {
    Rect(Rect),
    Polygon(Polygon),
    Path(Path),
}
impl Default for Shape {
    fn default() -> Self {
        Self::Rect(Rect::default())
    }
}

/// # ShapeTrait
///
/// Common shape operations, dispatched from the [Shape] enum to its variants by [enum_dispatch].
///
#[enum_dispatch]
pub trait ShapeTrait {
    /// Shift coordinates by the (x,y) values specified in `pt`
    fn shift(&mut self, pt: &Point);
    /// Boolean indication of whether the [Shape] contains [Point] `pt`.
    /// Containment is *inclusive* for all [Shape] types.
    fn contains(&self, pt: &Point) -> bool;
    /// Convert to [Polygon]s covering the same area.
    /// One for [Rect]s and [Polygon]s, and one per segment for [Path]s.
    fn to_polys(&self) -> Vec<Polygon>;
}

impl ShapeTrait for Rect {
    fn shift(&mut self, pt: &Point) {
        self.p0 = self.p0.shift(pt);
        self.p1 = self.p1.shift(pt);
    }
    fn contains(&self, pt: &Point) -> bool {
        let (p0, p1) = (&self.p0, &self.p1);
        p0.x.min(p1.x) <= pt.x
            && p0.x.max(p1.x) >= pt.x
            && p0.y.min(p1.y) <= pt.y
            && p0.y.max(p1.y) >= pt.y
    }
    fn to_polys(&self) -> Vec<Polygon> {
        // Counter-clockwise from the lower-left
        vec![Polygon {
            points: vec![
                self.p0,
                Point::new(self.p1.x, self.p0.y),
                self.p1,
                Point::new(self.p0.x, self.p1.y),
            ],
        }]
    }
}
impl ShapeTrait for Polygon {
    fn shift(&mut self, pt: &Point) {
        for p in self.points.iter_mut() {
            *p = p.shift(pt);
        }
    }
    /// Winding-number containment test. Points on the boundary count as inside.
    fn contains(&self, pt: &Point) -> bool {
        if self.points.is_empty() || !self.points.bbox().contains(pt) {
            return false;
        }
        clip::contains(&self.points, pt)
    }
    fn to_polys(&self) -> Vec<Polygon> {
        vec![self.clone()]
    }
}
impl ShapeTrait for Path {
    fn shift(&mut self, pt: &Point) {
        for p in self.points.iter_mut() {
            *p = p.shift(pt);
        }
    }
    fn contains(&self, pt: &Point) -> bool {
        self.to_polys().iter().any(|p| p.contains(pt))
    }
    /// One quadrilateral per (non-degenerate) segment.
    /// Interior joints are extended by half the width, so consecutive segments overlap at corners.
    /// Path ends are extended per [PathEnds].
    fn to_polys(&self) -> Vec<Polygon> {
        let pts: Vec<&Point> = {
            let mut v: Vec<&Point> = Vec::with_capacity(self.points.len());
            for p in self.points.iter() {
                if v.last() != Some(&p) {
                    v.push(p);
                }
            }
            v
        };
        if pts.len() < 2 || self.width <= 0 {
            return Vec::new();
        }
        let half = self.width as f64 / 2.0;
        let (ext_begin, ext_end) = self.ends.extensions(self.width);
        let nseg = pts.len() - 1;
        let mut polys = Vec::with_capacity(nseg);
        for k in 0..nseg {
            let (a, b) = (pts[k], pts[k + 1]);
            let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
            let len = dx.hypot(dy);
            // Unit direction and normal
            let (ux, uy) = (dx / len, dy / len);
            let (nx, ny) = (-uy * half, ux * half);
            let es = if k == 0 { ext_begin } else { half };
            let ee = if k == nseg - 1 { ext_end } else { half };
            let (ax, ay) = (a.x as f64 - ux * es, a.y as f64 - uy * es);
            let (bx, by) = (b.x as f64 + ux * ee, b.y as f64 + uy * ee);
            let corner = |x: f64, y: f64| Point::new(x.round() as Int, y.round() as Int);
            polys.push(Polygon {
                points: vec![
                    corner(ax - nx, ay - ny),
                    corner(bx - nx, by - ny),
                    corner(bx + nx, by + ny),
                    corner(ax + nx, ay + ny),
                ],
            });
        }
        polys
    }
}

/// # Matrix-Vector Transformation
///
/// 2x2 rotation-matrix and two-entry translation vector,
/// used for relative movement of [Point]s and [Shape]s.
///
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation / Transformation Matrix
    /// Represented in row-major order
    pub a: [[f64; 2]; 2],
    /// X-Y Translation
    pub b: [f64; 2],
}
impl Transform {
    /// The identity transform, leaving any transformed object unmodified
    pub fn identity() -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [0., 0.],
        }
    }
    /// Translation by (x,y)
    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            a: [[1., 0.], [0., 1.]],
            b: [x, y],
        }
    }
    /// A transform to rotate by `angle` degrees
    pub fn rotate(angle: f64) -> Self {
        let (sin, cos) = sin_cos(angle);
        Self {
            a: [[cos, -sin], [sin, cos]],
            b: [0., 0.],
        }
    }
    /// A transform to reflect about the x-axis
    pub fn reflect_vert() -> Self {
        Self {
            a: [[1., 0.], [0., -1.]],
            b: [0., 0.],
        }
    }
    /// Create a transform from instance fields: location, reflection, rotation and magnification.
    /// Reflection about the x-axis applies first, then magnification and rotation, then translation.
    pub fn from_instance(loc: &Point, reflect_vert: bool, angle: f64, mag: f64) -> Self {
        let (sin, cos) = sin_cos(angle);
        let refl = if reflect_vert { -1.0 } else { 1.0 };
        Self {
            a: [
                [mag * cos, -mag * sin * refl],
                [mag * sin, mag * cos * refl],
            ],
            b: [loc.x as f64, loc.y as f64],
        }
    }
    /// Create a new [Transform] that is the cascade of `parent` and `child`.
    ///
    /// "Parents" and "children" refer to typical layout-instance hierarchies,
    /// in which each layer of instance has a nested set of transformations relative to its top-level parent.
    ///
    /// Note this operation *is not* commutative.
    /// For example the set of transformations:
    /// * (a) Reflect vertically, then
    /// * (b) Translate by (1,1)
    /// * (c) Place a point at (local coordinate) (1,1)
    ///
    /// Lands said point at (2,-2) in top-level space,
    /// whereas reversing the order of (a) and (b) lands it at (2,0).
    ///
    pub fn cascade(parent: &Transform, child: &Transform) -> Transform {
        let mut b = matvec(&parent.a, &child.b);
        b[0] += parent.b[0];
        b[1] += parent.b[1];
        let a = matmul(&parent.a, &child.a);
        Self { a, b }
    }
}
/// Sine and cosine of `angle` degrees, exact at multiples of 90
fn sin_cos(angle: f64) -> (f64, f64) {
    let quarter = angle / 90.0;
    if quarter == quarter.round() {
        match (quarter.round() as i64).rem_euclid(4) {
            0 => (0., 1.),
            1 => (1., 0.),
            2 => (0., -1.),
            _ => (-1., 0.),
        }
    } else {
        let rad = angle.to_radians();
        (rad.sin(), rad.cos())
    }
}
/// Multiply 2x2 matrices, returning a new 2x2 matrix
fn matmul(a: &[[f64; 2]; 2], b: &[[f64; 2]; 2]) -> [[f64; 2]; 2] {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}
/// Multiply a 2x2 matrix by a 2-entry vector, returning a new 2-entry vector
fn matvec(a: &[[f64; 2]; 2], b: &[f64; 2]) -> [f64; 2] {
    [
        a[0][0] * b[0] + a[0][1] * b[1],
        a[1][0] * b[0] + a[1][1] * b[1],
    ]
}
pub trait TransformTrait {
    /// Apply matrix-vector [Transform] `trans`.
    /// Creates a new shape at a location equal to the transformation of our own.
    fn transform(&self, trans: &Transform) -> Self;
}
impl TransformTrait for Polygon {
    fn transform(&self, trans: &Transform) -> Self {
        Polygon {
            points: self.points.iter().map(|p| p.transform(trans)).collect(),
        }
    }
}
impl TransformTrait for BoundBox {
    /// Bounding box of our four transformed corners
    fn transform(&self, trans: &Transform) -> Self {
        if self.is_empty() {
            return self.clone();
        }
        let corners = [
            self.p0,
            Point::new(self.p1.x, self.p0.y),
            self.p1,
            Point::new(self.p0.x, self.p1.y),
        ];
        corners
            .iter()
            .map(|p| p.transform(trans))
            .collect::<Vec<_>>()
            .bbox()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn square() -> Polygon {
        Rect::new(Point::new(0, 0), Point::new(1, 1)).to_polys().remove(0)
    }
    #[test]
    fn transform_identity() {
        let p = square();
        assert_eq!(p.transform(&Transform::identity()), p);
    }
    #[test]
    fn transform_rotate() {
        let trans = Transform::rotate(90.);
        let p1 = Point::new(1, 0).transform(&trans);
        assert_eq!(p1, Point::new(0, 1));
        let p2 = p1.transform(&trans);
        assert_eq!(p2, Point::new(-1, 0));
        let p3 = p2.transform(&trans);
        assert_eq!(p3, Point::new(0, -1));
        assert_eq!(p3.transform(&trans), Point::new(1, 0));
        // Rotation by multiples of 90 degrees is exact, for any magnitude
        let big = Point::new(1 << 40, 3);
        assert_eq!(
            big.transform(&Transform::rotate(-270.)),
            Point::new(-3, 1 << 40)
        );
    }
    #[test]
    fn test_cascade1() {
        let trans1 = Transform::reflect_vert();
        let trans2 = Transform::translate(1., 1.);

        let p = Point::new(1, 1);
        let cascade1 = Transform::cascade(&trans1, &trans2);
        let pc1 = p.transform(&cascade1);
        assert_eq!(pc1, Point::new(2, -2));

        let cascade2 = Transform::cascade(&trans2, &trans1);
        let pc1 = p.transform(&cascade2);
        assert_eq!(pc1, Point::new(2, 0));
    }
    #[test]
    fn instance_transforms_reflect_first() {
        // Reflect, then rotate 90, then magnify by 2, then move to (10, 0)
        let t = Transform::from_instance(&Point::new(10, 0), true, 90., 2.);
        assert_eq!(Point::new(1, 0).transform(&t), Point::new(10, 2));
        assert_eq!(Point::new(0, 1).transform(&t), Point::new(12, 0));
    }
    #[test]
    fn test_polygon_contains() {
        // Create a right triangle at the origin
        let triangle = Polygon {
            points: vec![Point::new(0, 0), Point::new(2, 0), Point::new(0, 2)],
        };
        assert!(triangle.contains(&Point::new(0, 0)));
        assert!(triangle.contains(&Point::new(1, 0)));
        assert!(triangle.contains(&Point::new(1, 1)));
        assert!(!triangle.contains(&Point::new(2, 2)));

        // A U-shaped polygon, inside a 10x10 square
        let u = Polygon {
            points: vec![
                Point::new(0, 0),
                Point::new(0, 10),
                Point::new(2, 10),
                Point::new(2, 2),
                Point::new(8, 2),
                Point::new(8, 10),
                Point::new(10, 10),
                Point::new(10, 0),
            ],
        };
        for pt in &u.points {
            assert!(u.contains(pt));
        }
        assert!(u.contains(&Point::new(1, 9)));
        assert!(u.contains(&Point::new(9, 1)));
        assert!(!u.contains(&Point::new(3, 3)));
        assert!(!u.contains(&Point::new(7, 9)));
    }
    #[test]
    fn path_polygons() {
        // An L-shaped path, width 2, flush ends
        let path = Path {
            points: vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10)],
            width: 2,
            ends: PathEnds::Flush,
        };
        let polys = path.to_polys();
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[0].as_rect(), Some(BoundBox::new(0, -1, 11, 1)));
        assert_eq!(polys[1].as_rect(), Some(BoundBox::new(9, -1, 11, 10)));
        // Half-width extensions at both ends
        let path = Path {
            ends: PathEnds::HalfWidth,
            ..path
        };
        let polys = path.to_polys();
        assert_eq!(polys[0].as_rect(), Some(BoundBox::new(-1, -1, 11, 1)));
        assert_eq!(polys[1].as_rect(), Some(BoundBox::new(9, -1, 11, 11)));
        assert!(path.contains(&Point::new(-1, 0)));
        assert!(!path.contains(&Point::new(5, 5)));
    }
}
