//!
//! # Density Calculation
//!
//! Windowed measurement of the fraction of area covered per layer.
//!

// Std-Lib
use std::collections::HashSet;

// Crates.io
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

// Workspace Imports
use fill21raw::{clip, BoundBox, BoundBoxTrait, FlatShape, FlatView, Int, Layer};
use fill21utils::SerdeFile;

// Local imports
use crate::index::SpatialIndex;
use crate::rules::{LayerRule, Resolved};

///
/// # Window Grid
///
/// Sliding windows over an extent, as the product of column and row spans.
/// Windows are clipped to the extent. Those narrower than half the window size
/// after clipping are dropped, unless the extent itself is that narrow.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowGrid {
    cols: Vec<(Int, Int)>,
    rows: Vec<(Int, Int)>,
}
impl WindowGrid {
    pub fn new(extent: &BoundBox, size: Int, step: Int) -> Self {
        if extent.is_empty() || size <= 0 || step <= 0 {
            return Self::default();
        }
        Self {
            cols: spans(extent.p0.x, extent.p1.x, size, step),
            rows: spans(extent.p0.y, extent.p1.y, size, step),
        }
    }
    pub fn len(&self) -> usize {
        self.cols.len() * self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Window number `idx`, in row-major order
    pub fn window(&self, idx: usize) -> BoundBox {
        let ncols = self.cols.len().max(1);
        let (x0, x1) = self.cols[idx % ncols];
        let (y0, y1) = self.rows[idx / ncols];
        BoundBox::new(x0, y0, x1, y1)
    }
    /// All windows, ordered by lower y, then lower x
    pub fn windows(&self) -> Vec<BoundBox> {
        (0..self.len()).map(|i| self.window(i)).collect()
    }
    /// Indices of windows which `region` overlaps with positive area
    pub fn overlapping(&self, region: &BoundBox) -> Vec<usize> {
        let hit = |spans: &[(Int, Int)], lo: Int, hi: Int| -> Vec<usize> {
            spans
                .iter()
                .enumerate()
                .filter(|(_, (s0, s1))| *s0 < hi && lo < *s1)
                .map(|(i, _)| i)
                .collect()
        };
        let cols = hit(&self.cols, region.p0.x, region.p1.x);
        let rows = hit(&self.rows, region.p0.y, region.p1.y);
        let ncols = self.cols.len();
        let mut rv = Vec::with_capacity(cols.len() * rows.len());
        for r in rows.iter() {
            for c in cols.iter() {
                rv.push(r * ncols + c);
            }
        }
        rv
    }
}

/// Window spans along one axis of the extent `lo..hi`
fn spans(lo: Int, hi: Int, size: Int, step: Int) -> Vec<(Int, Int)> {
    if hi <= lo {
        return Vec::new();
    }
    if 2 * (hi - lo) < size {
        return vec![(lo, hi)];
    }
    let mut spans = Vec::new();
    let mut start = lo;
    while start < hi {
        let end = (start + size).min(hi);
        if 2 * (end - start) < size {
            break;
        }
        spans.push((start, end));
        start += step;
    }
    spans
}

/// Measured density of one window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowDensity {
    pub window: BoundBox,
    pub density: f64,
}

/// # Layer Density
/// Overall and per-window density of one layer, or of the layers measured by one rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerDensity {
    /// Rule name, or the layer's `num/datatype`
    pub name: String,
    pub layer: Layer,
    pub extent: BoundBox,
    /// Density over the full extent
    pub density: f64,
    /// Per-window densities, row-major from the lower-left
    pub windows: Vec<WindowDensity>,
}
impl LayerDensity {
    /// Create from covered areas of the extent and of each of `windows`
    pub(crate) fn from_areas(
        name: impl Into<String>,
        layer: Layer,
        extent: &BoundBox,
        covered: f64,
        windows: &[BoundBox],
        areas: &[f64],
    ) -> Self {
        let windows = windows
            .iter()
            .zip(areas.iter())
            .map(|(w, a)| WindowDensity {
                window: w.clone(),
                density: ratio(*a, w.area()),
            })
            .collect();
        Self {
            name: name.into(),
            layer,
            extent: extent.clone(),
            density: ratio(covered, extent.area()),
            windows,
        }
    }
    /// Lowest window density
    pub fn min(&self) -> Option<f64> {
        self.windows.iter().map(|w| w.density).reduce(f64::min)
    }
    /// Highest window density
    pub fn max(&self) -> Option<f64> {
        self.windows.iter().map(|w| w.density).reduce(f64::max)
    }
}

/// Covered fraction, zero for empty regions
fn ratio(covered: f64, area: f64) -> f64 {
    if area > 0.0 {
        covered / area
    } else {
        0.0
    }
}

///
/// # Density Report
///
/// One [LayerDensity] per rule in rule order, or, without rules, per layer in layer order.
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DensityReport {
    pub layers: Vec<LayerDensity>,
}
impl SerdeFile for DensityReport {}
impl DensityReport {
    /// Get the entry for drawing layer `layer`
    pub fn get(&self, layer: Layer) -> Option<&LayerDensity> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

/// The region density windows are laid out over:
/// the bounding box of layer `boundary` if it has any shapes, or else of the whole layout.
pub fn extent(view: &FlatView, boundary: Option<Layer>) -> BoundBox {
    if let Some(layer) = boundary {
        let bbox = view
            .flatten(&BoundBox::everything())
            .layers([layer])
            .fold(BoundBox::empty(), |bbox, s| bbox.union(&s.bbox));
        if !bbox.is_empty() {
            return bbox;
        }
        debug!(%layer, "Boundary layer is empty, using the layout extent");
    }
    view.bbox()
}

/// Index the shapes on `layers`, within `region`
pub(crate) fn index_layers(view: &FlatView, layers: Vec<Layer>, region: &BoundBox) -> SpatialIndex {
    if region.is_empty() {
        return SpatialIndex::new();
    }
    SpatialIndex::build(view.flatten(region).layers(layers))
}

/// Area covered by shapes satisfying `pred`, within each of `regions`.
/// Regions are measured in parallel; results keep their order.
pub(crate) fn covered_areas(
    index: &SpatialIndex,
    regions: &[BoundBox],
    pred: &(impl Fn(&FlatShape) -> bool + Sync),
) -> Vec<f64> {
    regions
        .par_iter()
        .map(|region| covered_area(index, region, pred))
        .collect()
}

/// Area covered by shapes satisfying `pred`, within `region`
pub(crate) fn covered_area(
    index: &SpatialIndex,
    region: &BoundBox,
    pred: &impl Fn(&FlatShape) -> bool,
) -> f64 {
    let keys: Vec<_> = index
        .candidates(region)
        .into_iter()
        .filter(|k| index.get(*k).map(|s| pred(s)).unwrap_or(false))
        .collect();
    clip::union_area(index.polys(&keys), region)
}

/// Measure the layers of `rule` over `extent`
pub fn rule_density(view: &FlatView, rule: &LayerRule, extent: &BoundBox) -> LayerDensity {
    let measured: HashSet<Layer> = rule.measured().into_iter().collect();
    let index = index_layers(view, rule.measured(), extent);
    let pred = |s: &FlatShape| measured.contains(&s.layer);
    let windows = WindowGrid::new(extent, rule.window, rule.step).windows();
    let areas = covered_areas(&index, &windows, &pred);
    let covered = covered_area(&index, extent, &pred);
    debug!(rule = %rule.name, windows = windows.len(), "Measured density");
    LayerDensity::from_areas(&rule.name, rule.layer, extent, covered, &windows, &areas)
}

/// Measure `layer` as a single window spanning `extent`
pub fn layer_density(view: &FlatView, layer: Layer, extent: &BoundBox) -> LayerDensity {
    let index = index_layers(view, vec![layer], extent);
    let windows = if extent.is_empty() {
        Vec::new()
    } else {
        vec![extent.clone()]
    };
    let covered = covered_area(&index, extent, &|_: &FlatShape| true);
    let areas = vec![covered; windows.len()];
    LayerDensity::from_areas(layer.to_string(), layer, extent, covered, &windows, &areas)
}

/// Density of every rule's layers, or of every layer in the layout if there are no rules
pub fn compute_density(view: &FlatView, rules: &Resolved) -> DensityReport {
    let extent = extent(view, rules.boundary);
    let layers = if rules.rules.is_empty() {
        view.layout()
            .layers()
            .into_iter()
            .filter(|l| Some(*l) != rules.boundary)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|l| layer_density(view, l, &extent))
            .collect()
    } else {
        rules
            .rules
            .par_iter()
            .map(|r| rule_density(view, r, &extent))
            .collect()
    };
    DensityReport { layers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FillResult;
    use fill21raw::{Cell, Layout, Point, Rect, Tag, Units};

    #[test]
    fn window_spans() {
        assert_eq!(spans(0, 100, 100, 100), vec![(0, 100)]);
        assert_eq!(spans(0, 100, 100, 50), vec![(0, 100), (50, 100)]);
        assert_eq!(spans(0, 250, 100, 100), vec![(0, 100), (100, 200), (200, 250)]);
        // The 40-wide remainder is dropped
        assert_eq!(spans(0, 240, 100, 100), vec![(0, 100), (100, 200)]);
        // Narrow extents get a single window
        assert_eq!(spans(-10, 30, 100, 100), vec![(-10, 30)]);
        assert!(spans(5, 5, 100, 100).is_empty());
    }

    #[test]
    fn window_grid() {
        let grid = WindowGrid::new(&BoundBox::new(0, 0, 300, 200), 100, 100);
        assert_eq!(grid.len(), 6);
        let windows = grid.windows();
        assert_eq!(windows[0], BoundBox::new(0, 0, 100, 100));
        assert_eq!(windows[1], BoundBox::new(100, 0, 200, 100));
        assert_eq!(windows[3], BoundBox::new(0, 100, 100, 200));
        assert_eq!(grid.overlapping(&BoundBox::new(90, 90, 110, 110)), vec![0, 1, 3, 4]);
        // Abutting regions do not overlap
        assert_eq!(grid.overlapping(&BoundBox::new(100, 0, 200, 100)), vec![1]);
        assert!(WindowGrid::new(&BoundBox::empty(), 100, 100).is_empty());
    }

    /// A 100x100 layout with one rectangle on 1/0
    fn layout_with(x0: Int, y0: Int, x1: Int, y1: Int) -> Layout {
        let mut layout = Layout::new("lib", Units::new(1e-3, 1e-9));
        let mut top = Cell::new("top");
        top.elems.push(
            fill21raw::ShapeElem::new(
                Layer::new(1, 0),
                Tag::Design,
                Rect::new(Point::new(x0, y0), Point::new(x1, y1)),
            )
            .into(),
        );
        top.elems.push(
            fill21raw::ShapeElem::new(
                Layer::new(99, 0),
                Tag::Design,
                Rect::new(Point::new(0, 0), Point::new(100, 100)),
            )
            .into(),
        );
        layout.cells.insert("top".into(), top);
        layout
    }

    #[test]
    fn rules_free_density() -> FillResult<()> {
        let layout = layout_with(0, 0, 50, 20);
        let view = layout.flat_view()?;
        let report = compute_density(&view, &Resolved::default());
        assert_eq!(report.layers.len(), 2);
        let m1 = report.get(Layer::new(1, 0)).ok_or(crate::FillError::Config("m1".into()))?;
        assert_eq!(m1.name, "1/0");
        assert!((m1.density - 0.1).abs() < 1e-12);
        assert_eq!(m1.windows.len(), 1);

        // With a boundary layer, it is excluded from the report
        let rules = Resolved {
            boundary: Some(Layer::new(99, 0)),
            ..Default::default()
        };
        let report = compute_density(&view, &rules);
        assert_eq!(report.layers.len(), 1);
        Ok(())
    }

    #[test]
    fn boundary_sets_extent() -> FillResult<()> {
        let layout = layout_with(10, 10, 20, 20);
        let view = layout.flat_view()?;
        assert_eq!(extent(&view, None), BoundBox::new(0, 0, 100, 100));
        assert_eq!(
            extent(&view, Some(Layer::new(1, 0))),
            BoundBox::new(10, 10, 20, 20)
        );
        // Empty boundary layers fall back to the layout
        assert_eq!(
            extent(&view, Some(Layer::new(5, 5))),
            BoundBox::new(0, 0, 100, 100)
        );
        Ok(())
    }
}
