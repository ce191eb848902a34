//!
//! # Fill Generation
//!
//! Raises each density window of a layer toward its rule's minimum,
//! placing fill cells on a fixed lattice while honoring spacing and maximum-density limits.
//!
//! Windows are visited in row-major order, one layer at a time.
//! Each window sees the fill placed by those before it.
//!

// Std-Lib
use std::collections::HashSet;

// Crates.io
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// Workspace Imports
use fill21raw::{
    BoundBox, BoundBoxTrait, FlatShape, FlatView, Int, Layer, Polygon, Rect, ShapeTrait, Tag,
};

// Local imports
use crate::density::{covered_area, covered_areas, index_layers, LayerDensity, WindowGrid};
use crate::error::SaturationWarning;
use crate::rules::LayerRule;

/// Relative tolerance of density comparisons
pub const TOLERANCE: f64 = 1e-9;

///
/// # Layer Fill
///
/// The fill generated for one rule, not yet applied to any [Layout].
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerFill {
    /// Rule name
    pub rule: String,
    /// Drawing layer
    pub layer: Layer,
    /// Layer the fill is placed on
    pub fill_layer: Layer,
    /// Fill cells, in acceptance order
    pub rects: Vec<Rect>,
    pub warnings: Vec<SaturationWarning>,
    pub before: LayerDensity,
    pub after: LayerDensity,
}

/// Candidate fill cells inside `window`, lower-left corners on multiples of `pitch`.
/// Ordered by lowest y, then lowest x. Generated lazily, as fine pitches produce a great many.
fn lattice(window: &BoundBox, cell: (Int, Int), pitch: Int) -> impl Iterator<Item = BoundBox> {
    let (w, h) = cell;
    let (x0, y0) = (align_up(window.p0.x, pitch), align_up(window.p0.y, pitch));
    let cols = positions(x0, window.p1.x - w, pitch);
    let rows = positions(y0, window.p1.y - h, pitch);
    (0..rows).flat_map(move |j| {
        let y = y0 + j * pitch;
        (0..cols).map(move |i| {
            let x = x0 + i * pitch;
            BoundBox::new(x, y, x + w, y + h)
        })
    })
}

/// Number of multiples of `pitch` from `first` up to and including `last`
fn positions(first: Int, last: Int, pitch: Int) -> Int {
    if last < first {
        0
    } else {
        (last - first) / pitch + 1
    }
}

/// Smallest multiple of `pitch` at or above `v`
fn align_up(v: Int, pitch: Int) -> Int {
    v + (pitch - v.rem_euclid(pitch)) % pitch
}

/// Whether `outer` fully contains `inner`
fn encloses(outer: &BoundBox, inner: &BoundBox) -> bool {
    outer.p0.x <= inner.p0.x
        && outer.p0.y <= inner.p0.y
        && inner.p1.x <= outer.p1.x
        && inner.p1.y <= outer.p1.y
}

/// Flattened fill shape for cell `bbox`
fn fill_shape(layer: Layer, bbox: &BoundBox) -> FlatShape {
    let poly: Polygon = Rect::new(bbox.p0, bbox.p1)
        .to_polys()
        .pop()
        .unwrap_or_default();
    FlatShape {
        layer,
        tag: Tag::Fill,
        poly,
        bbox: bbox.clone(),
    }
}

///
/// Generate fill for `rule`, over the windows of `extent`.
/// Fill cells are placed only inside `core`, if provided.
///
/// Reads, and does not modify, the layout of `view`.
///
pub fn fill_layer(
    view: &FlatView,
    rule: &LayerRule,
    extent: &BoundBox,
    core: Option<&BoundBox>,
) -> LayerFill {
    info!(rule = %rule.name, layer = %rule.layer, "Filling");
    let measured: HashSet<Layer> = rule.measured().into_iter().collect();
    let keepout: HashSet<Layer> = rule.keepout.iter().copied().collect();
    let is_measured = |s: &FlatShape| measured.contains(&s.layer);
    // Fill must clear design and keep-out shapes
    let blocks = |s: &FlatShape| {
        keepout.contains(&s.layer) || (s.tag == Tag::Design && measured.contains(&s.layer))
    };
    let is_fill = |s: &FlatShape| s.tag == Tag::Fill && measured.contains(&s.layer);

    // Shapes just outside the extent still constrain spacing
    let halo = rule.spacing.max(rule.fill_spacing);
    let region = if extent.is_empty() {
        BoundBox::empty()
    } else {
        extent.expanded(halo)
    };
    let mut index = index_layers(view, rule.indexed(), &region);

    let grid = WindowGrid::new(extent, rule.window, rule.step);
    let windows = grid.windows();
    let mut covered = covered_areas(&index, &windows, &is_measured);
    let extent_covered = covered_area(&index, extent, &is_measured);
    let before = LayerDensity::from_areas(
        &rule.name,
        rule.layer,
        extent,
        extent_covered,
        &windows,
        &covered,
    );

    let mut rects: Vec<Rect> = Vec::new();
    let mut added = 0.0;
    let mut warnings = Vec::new();
    for (i, window) in windows.iter().enumerate() {
        let area = window.area();
        let target = rule.min_density * area * (1.0 - TOLERANCE);
        if covered[i] >= target {
            continue;
        }
        debug!(
            rule = %rule.name,
            window = ?(window.p0, window.p1),
            density = covered[i] / area,
            "Filling window"
        );
        for cell in lattice(window, rule.cell, rule.pitch) {
            if covered[i] >= target {
                break;
            }
            if let Some(core) = core {
                if !encloses(core, &cell) {
                    continue;
                }
            }
            if index.any_overlap(&cell.expanded(rule.spacing), &blocks) {
                continue;
            }
            if index.any_overlap(&cell.expanded(rule.fill_spacing), &is_fill) {
                continue;
            }
            // Fill never overlaps measured shapes, so covered areas simply add
            let gains: Vec<(usize, f64)> = grid
                .overlapping(&cell)
                .into_iter()
                .map(|j| (j, cell.intersection(&windows[j]).area()))
                .collect();
            let overshoots = gains.iter().any(|(j, gain)| {
                covered[*j] + gain > rule.max_density * windows[*j].area() * (1.0 + TOLERANCE)
            });
            if overshoots {
                continue;
            }
            for (j, gain) in gains {
                covered[j] += gain;
            }
            added += cell.area();
            index.insert(fill_shape(rule.fill_layer, &cell));
            rects.push(Rect::new(cell.p0, cell.p1));
        }
        if covered[i] < target {
            let warning = SaturationWarning {
                rule: rule.name.clone(),
                layer: rule.layer,
                window: window.clone(),
                density: covered[i] / area,
                target: rule.min_density,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
    }

    let after = LayerDensity::from_areas(
        &rule.name,
        rule.layer,
        extent,
        extent_covered + added,
        &windows,
        &covered,
    );
    info!(
        rule = %rule.name,
        inserted = rects.len(),
        saturated = warnings.len(),
        before = before.density,
        after = after.density,
        "Filled"
    );
    LayerFill {
        rule: rule.name.clone(),
        layer: rule.layer,
        fill_layer: rule.fill_layer,
        rects,
        warnings,
        before,
        after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FillResult;
    use fill21raw::{Cell, Layout, Point, ShapeElem, Units};

    #[test]
    fn lattice_order() {
        let origins: Vec<(Int, Int)> = lattice(&BoundBox::new(-5, 0, 45, 30), (10, 10), 20)
            .map(|c| (c.p0.x, c.p0.y))
            .collect();
        assert_eq!(origins, vec![(0, 0), (20, 0), (0, 20), (20, 20)]);
        assert_eq!(lattice(&BoundBox::new(0, 0, 25, 25), (30, 10), 5).count(), 0);
        assert_eq!(align_up(-5, 20), 0);
        assert_eq!(align_up(-25, 20), -20);
        assert_eq!(align_up(40, 20), 40);
    }

    #[test]
    fn fine_lattices_are_lazy() {
        // About 2.5e10 candidates, of which only the first few are generated
        let window = BoundBox::new(0, 0, 800_000, 800_000);
        let first: Vec<BoundBox> = lattice(&window, (1_000, 1_000), 5).take(3).collect();
        assert_eq!(
            first,
            vec![
                BoundBox::new(0, 0, 1_000, 1_000),
                BoundBox::new(5, 0, 1_005, 1_000),
                BoundBox::new(10, 0, 1_010, 1_000),
            ]
        );
    }

    fn rule(min: f64, max: f64, pitch: Int) -> LayerRule {
        LayerRule {
            name: "m1".into(),
            layer: Layer::new(1, 0),
            fill_layer: Layer::new(1, 0),
            keepout: vec![Layer::new(1, 5)],
            min_density: min,
            max_density: max,
            cell: (10, 10),
            spacing: 5,
            fill_spacing: 5,
            window: 100,
            step: 100,
            pitch,
        }
    }

    /// A 100x100 layout with a 10x10 square at its center, and a keep-out square in its corner
    fn layout() -> Layout {
        let mut layout = Layout::new("lib", Units::new(1e-3, 1e-9));
        let mut top = Cell::new("top");
        let rect = |x0, y0, x1, y1| Rect::new(Point::new(x0, y0), Point::new(x1, y1));
        for (layer, r) in [
            (Layer::new(1, 0), rect(45, 45, 55, 55)),
            (Layer::new(1, 5), rect(80, 80, 100, 100)),
            (Layer::new(99, 0), rect(0, 0, 100, 100)),
        ] {
            top.elems.push(ShapeElem::new(layer, Tag::Design, r).into());
        }
        layout.cells.insert("top".into(), top);
        layout
    }

    #[test]
    fn honors_spacing_and_keepout() -> FillResult<()> {
        let layout = layout();
        let extent = BoundBox::new(0, 0, 100, 100);
        let fill = fill_layer(&layout.flat_view()?, &rule(1.0, 1.0, 15), &extent, None);
        assert!(!fill.rects.is_empty());
        let design = BoundBox::new(45, 45, 55, 55);
        let keepout = BoundBox::new(80, 80, 100, 100);
        for r in fill.rects.iter() {
            let b = r.bbox();
            assert!(!b.expanded(5).overlaps(&design));
            assert!(!b.expanded(5).overlaps(&keepout));
            assert!(encloses(&extent, &b));
        }
        // Unreachable target, reported rather than failed
        assert_eq!(fill.warnings.len(), 1);
        assert_eq!(fill.before.windows.len(), 1);
        assert!(fill.after.density > fill.before.density);
        Ok(())
    }

    #[test]
    fn stops_at_min_density() -> FillResult<()> {
        let layout = layout();
        let extent = BoundBox::new(0, 0, 100, 100);
        let fill = fill_layer(&layout.flat_view()?, &rule(0.2, 0.35, 15), &extent, None);
        // 100 covered, plus 19 cells of 100 reaches 2000 of 10000
        assert_eq!(fill.rects.len(), 19);
        assert!(fill.warnings.is_empty());
        assert!((fill.after.windows[0].density - 0.2).abs() < 1e-12);
        assert_eq!(fill.rects[0].p0, Point::new(0, 0));
        Ok(())
    }

    #[test]
    fn respects_max_density() -> FillResult<()> {
        let layout = layout();
        let extent = BoundBox::new(0, 0, 100, 100);
        // A maximum just short of one more cell
        let fill = fill_layer(&layout.flat_view()?, &rule(0.0195, 0.0195, 15), &extent, None);
        assert!(fill.rects.is_empty());
        assert_eq!(fill.warnings.len(), 1);
        // And one exactly reaching it
        let fill = fill_layer(&layout.flat_view()?, &rule(0.02, 0.02, 15), &extent, None);
        assert_eq!(fill.rects.len(), 1);
        assert!(fill.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn stays_inside_core() -> FillResult<()> {
        let layout = layout();
        let extent = BoundBox::new(0, 0, 100, 100);
        let core = BoundBox::new(0, 0, 40, 40);
        let fill = fill_layer(&layout.flat_view()?, &rule(1.0, 1.0, 15), &extent, Some(&core));
        // Origins 0, 15 and 30 in each axis
        assert_eq!(fill.rects.len(), 9);
        assert!(fill.rects.iter().all(|r| encloses(&core, &r.bbox())));
        Ok(())
    }
}
