//!
//! # Polygon Clipping, Area & Distance
//!
//! Area computations operate on polygon vertex-slices, with the closing edge implied.
//! Integer arithmetic is used wherever results are exact, and `f64` elsewhere.
//!

// Local imports
use crate::{
    bbox::{BoundBox, BoundBoxTrait},
    geom::Point,
};

/// Signed (shoelace) area. Positive for counter-clockwise vertex orders.
pub fn area(pts: &[Point]) -> f64 {
    let n = pts.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice: i128 = 0;
    for i in 0..n {
        let (p, q) = (&pts[i], &pts[(i + 1) % n]);
        twice += p.x as i128 * q.y as i128 - q.x as i128 * p.y as i128;
    }
    twice as f64 / 2.0
}

/// Cross product of (b - a) and (p - a).
/// Positive when `p` lies left of the directed line from `a` to `b`.
pub fn cross(a: &Point, b: &Point, p: &Point) -> i128 {
    (b.x - a.x) as i128 * (p.y - a.y) as i128 - (b.y - a.y) as i128 * (p.x - a.x) as i128
}

/// Boolean indication of whether `p` lies on the closed segment from `a` to `b`
pub fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
    cross(a, b, p) == 0
        && a.x.min(b.x) <= p.x
        && p.x <= a.x.max(b.x)
        && a.y.min(b.y) <= p.y
        && p.y <= a.y.max(b.y)
}

/// Winding-number containment. Points on the boundary count as inside.
pub fn contains(pts: &[Point], pt: &Point) -> bool {
    let n = pts.len();
    let mut winding_num: isize = 0;
    for idx in 0..n {
        let (past, next) = (&pts[idx], &pts[(idx + 1) % n]);
        if on_segment(past, next, pt) {
            return true;
        }
        // Upward crossings to the right of `pt` count positive, downward negative
        if past.y <= pt.y {
            if next.y > pt.y && cross(past, next, pt) > 0 {
                winding_num += 1;
            }
        } else if next.y <= pt.y && cross(past, next, pt) < 0 {
            winding_num -= 1;
        }
    }
    winding_num != 0
}

/// Our [BoundBox], if `pts` are the four corners of an axis-aligned rectangle
pub fn rect_of(pts: &[Point]) -> Option<BoundBox> {
    if pts.len() != 4 {
        return None;
    }
    let horizontal_first = pts[0].y == pts[1].y
        && pts[1].x == pts[2].x
        && pts[2].y == pts[3].y
        && pts[3].x == pts[0].x;
    let vertical_first = pts[0].x == pts[1].x
        && pts[1].y == pts[2].y
        && pts[2].x == pts[3].x
        && pts[3].y == pts[0].y;
    if horizontal_first || vertical_first {
        return Some(BoundBox::from_points(pts[0], pts[2]));
    }
    None
}

/// Clip polygon `pts` to `rect`, Sutherland-Hodgman style.
/// Returns the (possibly degenerate) clipped vertices.
pub fn clip_to_rect(pts: &[Point], rect: &BoundBox) -> Vec<[f64; 2]> {
    let mut out: Vec<[f64; 2]> = pts.iter().map(|p| [p.x as f64, p.y as f64]).collect();
    let (x0, y0) = (rect.p0.x as f64, rect.p0.y as f64);
    let (x1, y1) = (rect.p1.x as f64, rect.p1.y as f64);
    // Each half-plane as (axis, bound, keep-greater)
    let planes = [(0, x0, true), (0, x1, false), (1, y0, true), (1, y1, false)];
    for (axis, bound, greater) in planes {
        if out.is_empty() {
            break;
        }
        let inside = |p: &[f64; 2]| {
            if greater {
                p[axis] >= bound
            } else {
                p[axis] <= bound
            }
        };
        let input = std::mem::take(&mut out);
        let n = input.len();
        for i in 0..n {
            let (cur, prev) = (&input[i], &input[(i + n - 1) % n]);
            let (cin, pin) = (inside(cur), inside(prev));
            if cin != pin {
                // Crossing point, with the clipped coordinate set exactly
                let t = (bound - prev[axis]) / (cur[axis] - prev[axis]);
                let other = 1 - axis;
                let mut x = [0.0; 2];
                x[axis] = bound;
                x[other] = prev[other] + t * (cur[other] - prev[other]);
                out.push(x);
            }
            if cin {
                out.push(*cur);
            }
        }
    }
    out
}

/// Area of polygon `pts` lying inside `rect`
pub fn clipped_area(pts: &[Point], rect: &BoundBox) -> f64 {
    if let Some(r) = rect_of(pts) {
        return r.intersection(rect).area();
    }
    let clipped = clip_to_rect(pts, rect);
    let n = clipped.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let (p, q) = (&clipped[i], &clipped[(i + 1) % n]);
        twice += p[0] * q[1] - q[0] * p[1];
    }
    (twice / 2.0).abs()
}

/// Boolean indication of whether simple polygon `pts` overlaps `rect` with positive area.
/// Exact: either an edge passes through the interior of `rect`, or `rect` lies wholly inside.
pub fn overlaps_rect(pts: &[Point], rect: &BoundBox) -> bool {
    let bbox = pts.bbox();
    if pts.len() < 3 || !bbox.overlaps(rect) {
        return false;
    }
    if rect_of(pts).is_some() {
        return true;
    }
    let n = pts.len();
    if (0..n).any(|i| crosses_interior(&pts[i], &pts[(i + 1) % n], rect)) {
        return true;
    }
    // No edge enters, so `rect` is either wholly inside or wholly outside
    let within = bbox.p0.x <= rect.p0.x
        && bbox.p0.y <= rect.p0.y
        && rect.p1.x <= bbox.p1.x
        && rect.p1.y <= bbox.p1.y;
    if !within {
        return false;
    }
    // Test its center, in doubled coordinates to keep it on the integer grid
    let doubled: Vec<Point> = pts.iter().map(|p| Point::new(2 * p.x, 2 * p.y)).collect();
    let center = Point::new(rect.p0.x + rect.p1.x, rect.p0.y + rect.p1.y);
    contains(&doubled, &center)
}

/// Boolean indication of whether any point of segment `a-b` lies strictly inside `rect`.
/// Intersects the open parameter ranges along each axis, comparing fractions exactly.
fn crosses_interior(a: &Point, b: &Point, rect: &BoundBox) -> bool {
    // Bounds on the parameter `t`, as (numerator, positive denominator)
    let mut lo: (i128, i128) = (0, 1);
    let mut hi: (i128, i128) = (1, 1);
    let axes = [
        (a.x, b.x, rect.p0.x, rect.p1.x),
        (a.y, b.y, rect.p0.y, rect.p1.y),
    ];
    for (p, q, min, max) in axes {
        let (p, q, min, max) = (p as i128, q as i128, min as i128, max as i128);
        let d = q - p;
        let (from_min, from_max) = (min - p, max - p);
        if d == 0 {
            if from_min >= 0 || from_max <= 0 {
                return false;
            }
            continue;
        }
        // `min < p + t * d < max`, solved for `t`
        let (enter, exit) = if d > 0 {
            ((from_min, d), (from_max, d))
        } else {
            ((-from_max, -d), (-from_min, -d))
        };
        if enter.0 * lo.1 > lo.0 * enter.1 {
            lo = enter;
        }
        if exit.0 * hi.1 < hi.0 * exit.1 {
            hi = exit;
        }
    }
    lo.0 * hi.1 < hi.0 * lo.1
}

/// Area of the union of `polys`, within `rect`.
/// Overlapping polygons are counted once, whatever their orientation.
/// Self-overlaps resolve by the non-zero winding rule.
pub fn union_area<'a>(polys: impl IntoIterator<Item = &'a [Point]>, rect: &BoundBox) -> f64 {
    if rect.is_empty() {
        return 0.0;
    }
    let polys: Vec<&[Point]> = polys.into_iter().filter(|p| p.len() >= 3).collect();
    let rects: Option<Vec<BoundBox>> = polys.iter().map(|p| rect_of(p)).collect();
    match rects {
        Some(rects) => rect_union_area(&rects, rect),
        None => slab_union_area(&polys, rect),
    }
}

/// Union area of rectangles within `clip`, by a sweep over a segment tree of x-intervals
pub fn rect_union_area(rects: &[BoundBox], clip: &BoundBox) -> f64 {
    let clipped: Vec<BoundBox> = rects
        .iter()
        .map(|r| r.intersection(clip))
        .filter(|r| r.area() > 0.0)
        .collect();
    if clipped.is_empty() {
        return 0.0;
    }
    let mut xs: Vec<i64> = clipped.iter().flat_map(|r| [r.p0.x, r.p1.x]).collect();
    xs.sort_unstable();
    xs.dedup();
    // Events: (y, +1 for bottom edges / -1 for top, x-range)
    let mut events: Vec<(i64, i32, i64, i64)> = Vec::with_capacity(2 * clipped.len());
    for r in &clipped {
        events.push((r.p0.y, 1, r.p0.x, r.p1.x));
        events.push((r.p1.y, -1, r.p0.x, r.p1.x));
    }
    events.sort_unstable();
    let mut tree = CoverTree::new(&xs);
    let mut total = 0.0;
    let mut last_y = events[0].0;
    for (y, delta, xa, xb) in events {
        total += tree.covered() * (y - last_y) as f64;
        last_y = y;
        let (l, r) = (tree.index(xa), tree.index(xb));
        if l < r {
            tree.update(1, 0, xs.len() - 1, l, r, delta);
        }
    }
    total
}

/// Segment tree tracking the covered length of a set of x-intervals
struct CoverTree<'x> {
    xs: &'x [i64],
    count: Vec<i32>,
    len: Vec<f64>,
}
impl<'x> CoverTree<'x> {
    fn new(xs: &'x [i64]) -> Self {
        let n = 4 * xs.len().max(1);
        Self {
            xs,
            count: vec![0; n],
            len: vec![0.0; n],
        }
    }
    fn index(&self, x: i64) -> usize {
        self.xs.partition_point(|v| *v < x)
    }
    fn covered(&self) -> f64 {
        self.len[1]
    }
    /// Add `delta` to the elementary intervals between `xs[ql]` and `xs[qr]`.
    /// Node `node` spans `xs[lo]..xs[hi]`.
    fn update(&mut self, node: usize, lo: usize, hi: usize, ql: usize, qr: usize, delta: i32) {
        if qr <= lo || hi <= ql {
            return;
        }
        if ql <= lo && hi <= qr {
            self.count[node] += delta;
        } else {
            let mid = (lo + hi) / 2;
            self.update(2 * node, lo, mid, ql, qr, delta);
            self.update(2 * node + 1, mid, hi, ql, qr, delta);
        }
        self.len[node] = if self.count[node] > 0 {
            (self.xs[hi] - self.xs[lo]) as f64
        } else if hi - lo == 1 {
            0.0
        } else {
            self.len[2 * node] + self.len[2 * node + 1]
        };
    }
}

/// Non-horizontal polygon edge, oriented upward, with its original direction and polygon index
#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    dir: i32,
    poly: usize,
}
impl Edge {
    fn x_at(&self, y: f64) -> f64 {
        if self.x0 == self.x1 {
            return self.x0;
        }
        self.x0 + (self.x1 - self.x0) * (y - self.y0) / (self.y1 - self.y0)
    }
}

/// General union area within `rect`, integrating covered lengths over horizontal slabs.
/// Slabs break at every vertex and every edge crossing, so covered length is linear within each,
/// and its mid-height value is exact.
fn slab_union_area(polys: &[&[Point]], rect: &BoundBox) -> f64 {
    let (ry0, ry1) = (rect.p0.y as f64, rect.p1.y as f64);
    let (rx0, rx1) = (rect.p0.x as f64, rect.p1.x as f64);
    let mut edges: Vec<Edge> = Vec::new();
    let mut ys: Vec<f64> = vec![ry0, ry1];
    for (poly, pts) in polys.iter().enumerate() {
        let n = pts.len();
        for i in 0..n {
            let (p, q) = (&pts[i], &pts[(i + 1) % n]);
            if p.y == q.y {
                continue;
            }
            let (lo, hi, dir) = if p.y < q.y { (p, q, 1) } else { (q, p, -1) };
            let (y0, y1) = (lo.y as f64, hi.y as f64);
            if y1 <= ry0 || y0 >= ry1 {
                continue;
            }
            for y in [y0, y1] {
                if y > ry0 && y < ry1 {
                    ys.push(y);
                }
            }
            edges.push(Edge {
                x0: lo.x as f64,
                y0,
                x1: hi.x as f64,
                y1,
                dir,
                poly,
            });
        }
    }
    ys.sort_by(f64::total_cmp);
    ys.dedup();
    edges.sort_by(|a, b| a.y0.total_cmp(&b.y0));

    let mut total = 0.0;
    let mut next_edge = 0;
    let mut active: Vec<Edge> = Vec::new();
    for w in ys.windows(2) {
        let (ya, yb) = (w[0], w[1]);
        active.retain(|e| e.y1 > ya);
        while next_edge < edges.len() && edges[next_edge].y0 <= ya {
            if edges[next_edge].y1 > ya {
                active.push(edges[next_edge]);
            }
            next_edge += 1;
        }
        if active.is_empty() {
            continue;
        }
        let mut breaks = vec![ya, yb];
        breaks.extend(crossings(&active, ya, yb));
        breaks.sort_by(f64::total_cmp);
        breaks.dedup();
        for s in breaks.windows(2) {
            let ym = (s[0] + s[1]) / 2.0;
            total += covered_length(&active, polys.len(), ym, rx0, rx1) * (s[1] - s[0]);
        }
    }
    total
}

/// Heights strictly within (ya, yb) at which any pair of `active` edges cross
fn crossings(active: &[Edge], ya: f64, yb: f64) -> Vec<f64> {
    let mut order: Vec<(f64, f64)> = active.iter().map(|e| (e.x_at(ya), e.x_at(yb))).collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    if order.windows(2).all(|w| w[0].1 <= w[1].1) {
        return Vec::new();
    }
    let mut ys = Vec::new();
    for i in 0..order.len() {
        for j in i + 1..order.len() {
            let (da, db) = (order[i].0 - order[j].0, order[i].1 - order[j].1);
            if da * db < 0.0 {
                let t = da / (da - db);
                ys.push(ya + t * (yb - ya));
            }
        }
    }
    ys
}

/// Length of the cross-section of `active` edges at height `y`, within (x0, x1),
/// covered by at least one of `npolys` polygons.
/// Each polygon fills by its own non-zero winding number, so orientation does not matter.
fn covered_length(active: &[Edge], npolys: usize, y: f64, x0: f64, x1: f64) -> f64 {
    let mut xs: Vec<(f64, i32, usize)> = active.iter().map(|e| (e.x_at(y), e.dir, e.poly)).collect();
    xs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut windings = vec![0i32; npolys];
    let mut inside = 0usize;
    let mut len = 0.0;
    let mut prev = f64::NEG_INFINITY;
    for (x, dir, poly) in xs {
        if inside > 0 {
            let (a, b) = (prev.max(x0), x.min(x1));
            if b > a {
                len += b - a;
            }
        }
        let was = windings[poly] != 0;
        windings[poly] += dir;
        match (was, windings[poly] != 0) {
            (false, true) => inside += 1,
            (true, false) => inside -= 1,
            _ => (),
        }
        prev = x;
    }
    len
}

/// Boolean indication of whether closed segments `a0-a1` and `b0-b1` share any point
pub fn segments_intersect(a0: &Point, a1: &Point, b0: &Point, b1: &Point) -> bool {
    let d1 = cross(b0, b1, a0).signum();
    let d2 = cross(b0, b1, a1).signum();
    let d3 = cross(a0, a1, b0).signum();
    let d4 = cross(a0, a1, b1).signum();
    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }
    on_segment(b0, b1, a0) || on_segment(b0, b1, a1) || on_segment(a0, a1, b0) || on_segment(a0, a1, b1)
}

/// Euclidean distance from `p` to the closed segment `a-b`
pub fn point_segment_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let (px, py) = (p.x as f64, p.y as f64);
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    (px - (ax + t * dx)).hypot(py - (ay + t * dy))
}

/// Minimum Euclidean distance between two polygons. Zero if they touch or overlap.
pub fn distance(a: &[Point], b: &[Point]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    if contains(b, &a[0]) || contains(a, &b[0]) {
        return 0.0;
    }
    let (na, nb) = (a.len(), b.len());
    let mut best = f64::INFINITY;
    for i in 0..na {
        let (a0, a1) = (&a[i], &a[(i + 1) % na]);
        for j in 0..nb {
            let (b0, b1) = (&b[j], &b[(j + 1) % nb]);
            if segments_intersect(a0, a1, b0, b1) {
                return 0.0;
            }
            best = best
                .min(point_segment_distance(a0, b0, b1))
                .min(point_segment_distance(a1, b0, b1))
                .min(point_segment_distance(b0, a0, a1))
                .min(point_segment_distance(b1, a0, a1));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: i64, y0: i64, x1: i64, y1: i64) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }
    fn triangle() -> Vec<Point> {
        vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)]
    }

    #[test]
    fn shoelace() {
        assert_eq!(area(&rect(0, 0, 10, 5)), 50.0);
        let mut cw = rect(0, 0, 10, 5);
        cw.reverse();
        assert_eq!(area(&cw), -50.0);
        assert_eq!(area(&triangle()), 50.0);
        assert_eq!(area(&[Point::new(0, 0), Point::new(1, 1)]), 0.0);
    }
    #[test]
    fn clipping() {
        let window = BoundBox::new(0, 0, 5, 5);
        assert_eq!(clipped_area(&rect(-5, -5, 2, 3), &window), 6.0);
        // Triangle x + y <= 10, clipped to [0,5]^2, is the full window
        assert_eq!(clipped_area(&triangle(), &window), 25.0);
        let window = BoundBox::new(5, 0, 10, 10);
        assert!((clipped_area(&triangle(), &window) - 12.5).abs() < 1e-9);
    }
    #[test]
    fn overlap_excludes_touching() {
        let window = BoundBox::new(10, 0, 20, 10);
        assert!(!overlaps_rect(&rect(0, 0, 10, 10), &window));
        assert!(overlaps_rect(&rect(0, 0, 11, 10), &window));
        // Triangle's hypotenuse touches (5,5)-(10,0) but the corner (10,0) only touches
        assert!(!overlaps_rect(&triangle(), &window));
        assert!(!overlaps_rect(&triangle(), &BoundBox::new(5, 5, 10, 10)));
        assert!(overlaps_rect(&triangle(), &BoundBox::new(4, 4, 10, 10)));
    }
    #[test]
    fn union_of_rects() {
        let a = rect(0, 0, 10, 10);
        let b = rect(5, 5, 15, 15);
        let window = BoundBox::new(0, 0, 100, 100);
        assert_eq!(union_area([&a[..], &b[..]], &window), 175.0);
        assert_eq!(union_area([&a[..], &a[..]], &window), 100.0);
        assert_eq!(union_area([&a[..], &b[..]], &BoundBox::new(5, 0, 10, 20)), 75.0);
        assert_eq!(union_area(Vec::<&[Point]>::new(), &window), 0.0);
    }
    #[test]
    fn union_of_polygons() {
        let window = BoundBox::new(-100, -100, 100, 100);
        let t = triangle();
        let r = rect(0, 0, 5, 5);
        // The square lies within the triangle
        assert!((union_area([&t[..], &r[..]], &window) - 50.0).abs() < 1e-9);
        // Two crossing triangles: a bow-tie overlap
        let flipped = vec![Point::new(10, 10), Point::new(0, 10), Point::new(10, 0)];
        assert!((union_area([&t[..], &flipped[..]], &window) - 100.0).abs() < 1e-9);
        let diamond = vec![
            Point::new(0, -5),
            Point::new(5, 0),
            Point::new(0, 5),
            Point::new(-5, 0),
        ];
        assert!((union_area([&diamond[..], &r[..]], &window) - (50.0 + 25.0 - 12.5)).abs() < 1e-9);
    }
    #[test]
    fn union_ignores_orientation() {
        let window = BoundBox::new(-100, -100, 100, 100);
        let ccw = triangle();
        let mut cw = triangle();
        cw.reverse();
        assert_eq!(area(&cw), -50.0);
        assert!((union_area([&cw[..]], &window) - 50.0).abs() < 1e-9);
        assert!((union_area([&ccw[..], &cw[..]], &window) - 50.0).abs() < 1e-9);
        // Half-overlapping, opposite orientations
        let shifted: Vec<Point> = cw.iter().map(|p| Point::new(p.x + 5, p.y)).collect();
        let expected = 50.0 + 50.0 - 12.5;
        assert!((union_area([&ccw[..], &shifted[..]], &window) - expected).abs() < 1e-9);
        // And a clockwise rectangle among them
        let mut r = rect(0, 0, 5, 5);
        r.reverse();
        assert!((union_area([&ccw[..], &cw[..], &r[..]], &window) - 50.0).abs() < 1e-9);
    }
    #[test]
    fn slivers_overlap() {
        // The tip of a long, thin triangle covers 2.5e-7 of the unit square
        let sliver = vec![
            Point::new(0, 0),
            Point::new(2_000_000, 0),
            Point::new(2_000_000, 1),
        ];
        assert!(overlaps_rect(&sliver, &BoundBox::new(0, 0, 1, 1)));
        assert!(!overlaps_rect(&sliver, &BoundBox::new(-1, -1, 0, 1)));
        assert!(!overlaps_rect(&sliver, &BoundBox::new(0, -1, 10, 0)));
        // A window wholly inside a polygon, with no edge passing through it
        let big = triangle();
        assert!(overlaps_rect(&big, &BoundBox::new(1, 1, 2, 2)));
        let mut cw = big.clone();
        cw.reverse();
        assert!(overlaps_rect(&cw, &BoundBox::new(1, 1, 2, 2)));
        assert!(!overlaps_rect(&big, &BoundBox::new(6, 6, 9, 9)));
    }
    #[test]
    fn distances() {
        let a = rect(0, 0, 10, 10);
        assert_eq!(distance(&a, &rect(15, 0, 20, 10)), 5.0);
        assert_eq!(distance(&a, &rect(13, 14, 20, 20)), 5.0);
        assert_eq!(distance(&a, &rect(10, 10, 20, 20)), 0.0);
        assert_eq!(distance(&a, &rect(2, 2, 3, 3)), 0.0);
        assert_eq!(distance(&rect(2, 2, 3, 3), &a), 0.0);
        assert_eq!(distance(&a, &[]), f64::INFINITY);
    }
}
