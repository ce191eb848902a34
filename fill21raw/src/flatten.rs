//!
//! # Hierarchy Flattening
//!
//! Lazily walks a [Layout]'s cell hierarchy, yielding each shape as an absolute-coordinate [Polygon].
//!

// Std-Lib
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

// Local imports
use crate::{
    bbox::{BoundBox, BoundBoxTrait},
    data::{Cell, Element, Layer, Layout, Reference, ShapeElem, Tag},
    error::LayoutResult,
    geom::{Polygon, ShapeTrait, Transform, TransformTrait},
};

/// # Flattened Shape
/// A polygon in top-level coordinates, with its layer, tag and bounding box.
/// Paths flatten to one [FlatShape] per segment.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatShape {
    pub layer: Layer,
    pub tag: Tag,
    pub poly: Polygon,
    pub bbox: BoundBox,
}

///
/// # Flat View
///
/// A [Layout] paired with the bounding box of each of its cells.
/// The hierarchy is ordered (and checked for cycles) once, when the view is created,
/// and then flattened over any number of regions.
///
#[derive(Debug, Clone)]
pub struct FlatView<'a> {
    layout: &'a Layout,
    bboxes: HashMap<&'a str, BoundBox>,
}
impl<'a> FlatView<'a> {
    /// Create a [FlatView], computing cell bounding boxes in dependency order
    pub fn new(layout: &'a Layout) -> LayoutResult<Self> {
        let mut bboxes: HashMap<&str, BoundBox> = HashMap::new();
        for name in layout.dep_order()? {
            let cell = match layout.cells.get(name) {
                Some(c) => c,
                None => continue,
            };
            let mut bbox = BoundBox::empty();
            for elem in &cell.elems {
                match elem {
                    Element::Shape(s) => bbox = bbox.union(&s.shape.bbox()),
                    Element::Reference(r) => {
                        if let Some(child) = bboxes.get(r.cell.as_str()) {
                            bbox = bbox.union(&reference_bbox(r, child));
                        }
                    }
                    _ => (),
                }
            }
            bboxes.insert(name, bbox);
        }
        Ok(Self { layout, bboxes })
    }
    pub fn layout(&self) -> &'a Layout {
        self.layout
    }
    /// Bounding box of cell `name`, in its own coordinates
    pub fn cell_bbox(&self, name: &str) -> Option<&BoundBox> {
        self.bboxes.get(name)
    }
    /// Bounding box of all shapes, in top-level coordinates
    pub fn bbox(&self) -> BoundBox {
        let mut bbox = BoundBox::empty();
        for root in self.layout.roots() {
            if let Some(b) = self.bboxes.get(root) {
                bbox = bbox.union(b);
            }
        }
        bbox
    }
    /// Flatten all shapes whose bounding boxes touch `region`
    pub fn flatten<'s>(&'s self, region: &BoundBox) -> Flatten<'s> {
        let bboxes: &'s HashMap<&'s str, BoundBox> = &self.bboxes;
        Flatten::new(self.layout, Cow::Borrowed(bboxes), region)
    }
}

impl Layout {
    /// Create a [FlatView] of this layout
    pub fn flat_view(&self) -> LayoutResult<FlatView<'_>> {
        FlatView::new(self)
    }
    /// Bounding box of each cell, in its own coordinates.
    /// Empty for cells with no shapes anywhere in their hierarchy.
    pub fn cell_bboxes(&self) -> LayoutResult<HashMap<&str, BoundBox>> {
        Ok(self.flat_view()?.bboxes)
    }
    /// Bounding box of all shapes, in top-level coordinates
    pub fn bbox(&self) -> LayoutResult<BoundBox> {
        Ok(self.flat_view()?.bbox())
    }
    /// Flatten all shapes whose bounding boxes touch `region`.
    /// Each call orders the hierarchy anew. Use a [FlatView] to flatten many regions.
    pub fn flatten(&self, region: &BoundBox) -> LayoutResult<Flatten<'_>> {
        let view = self.flat_view()?;
        Ok(Flatten::new(self, Cow::Owned(view.bboxes), region))
    }
}

/// Bounding box of all of `r`'s placements of a cell with bounding box `child`
fn reference_bbox(r: &Reference, child: &BoundBox) -> BoundBox {
    let mut bbox = BoundBox::empty();
    if child.is_empty() || r.count() == 0 {
        return bbox;
    }
    for trans in r.corner_placements() {
        bbox = bbox.union(&child.transform(&trans));
    }
    bbox
}

/// Walk state per hierarchy level
enum Frame<'a> {
    /// Next element of `cell`, placed by `trans`
    Cell {
        cell: &'a Cell,
        trans: Transform,
        next: usize,
    },
    /// Next placement of an array reference, within a parent placed by `parent`
    Array {
        reference: &'a Reference,
        child: &'a Cell,
        parent: Transform,
        next: usize,
    },
}

/// Action decided per iteration, once the stack is no longer borrowed
enum Step<'a> {
    Pop,
    Elem(&'a Element, Transform),
    Place(&'a Cell, Transform),
}

///
/// # Flattening Iterator
///
/// Depth-first, in element order, using an explicit stack.
/// Sub-trees whose bounding boxes miss the region are skipped.
///
pub struct Flatten<'a> {
    layout: &'a Layout,
    bboxes: Cow<'a, HashMap<&'a str, BoundBox>>,
    region: BoundBox,
    layers: Option<HashSet<Layer>>,
    stack: Vec<Frame<'a>>,
    pending: Vec<FlatShape>,
}
impl<'a> Flatten<'a> {
    fn new(
        layout: &'a Layout,
        bboxes: Cow<'a, HashMap<&'a str, BoundBox>>,
        region: &BoundBox,
    ) -> Self {
        let mut stack = Vec::new();
        for root in layout.roots().into_iter().rev() {
            if let Some(cell) = layout.cells.get(root) {
                stack.push(Frame::Cell {
                    cell,
                    trans: Transform::identity(),
                    next: 0,
                });
            }
        }
        Self {
            layout,
            bboxes,
            region: region.clone(),
            layers: None,
            stack,
            pending: Vec::new(),
        }
    }
    /// Restrict output to shapes on `layers`
    pub fn layers(mut self, layers: impl IntoIterator<Item = Layer>) -> Self {
        self.layers = Some(layers.into_iter().collect());
        self
    }
    fn emit(&mut self, s: &ShapeElem, trans: &Transform) {
        if let Some(layers) = &self.layers {
            if !layers.contains(&s.layer) {
                return;
            }
        }
        let mut flat = Vec::new();
        for poly in s.shape.to_polys() {
            let poly = poly.transform(trans);
            let bbox = poly.bbox();
            if bbox.intersects(&self.region) {
                flat.push(FlatShape {
                    layer: s.layer,
                    tag: s.tag,
                    poly,
                    bbox,
                });
            }
        }
        self.pending.extend(flat.into_iter().rev());
    }
    fn enter(&mut self, r: &'a Reference, trans: &Transform) {
        let child = match self.layout.cells.get(&r.cell) {
            Some(c) => c,
            None => return,
        };
        let child_bbox = match self.bboxes.get(r.cell.as_str()) {
            Some(b) => b,
            None => return,
        };
        if !reference_bbox(r, child_bbox)
            .transform(trans)
            .intersects(&self.region)
        {
            return;
        }
        if r.array.is_none() {
            self.stack.push(Frame::Cell {
                cell: child,
                trans: Transform::cascade(trans, &r.transform()),
                next: 0,
            });
        } else {
            self.stack.push(Frame::Array {
                reference: r,
                child,
                parent: *trans,
                next: 0,
            });
        }
    }
    fn place(&mut self, cell: &'a Cell, trans: Transform) {
        let visible = match self.bboxes.get(cell.name.as_str()) {
            Some(b) => b.transform(&trans).intersects(&self.region),
            None => false,
        };
        if visible {
            self.stack.push(Frame::Cell {
                cell,
                trans,
                next: 0,
            });
        }
    }
}
impl<'a> Iterator for Flatten<'a> {
    type Item = FlatShape;
    fn next(&mut self) -> Option<FlatShape> {
        loop {
            if let Some(s) = self.pending.pop() {
                return Some(s);
            }
            let step = match self.stack.last_mut()? {
                Frame::Cell { cell, trans, next } => {
                    let cell: &'a Cell = *cell;
                    match cell.elems.get(*next) {
                        None => Step::Pop,
                        Some(elem) => {
                            *next += 1;
                            Step::Elem(elem, *trans)
                        }
                    }
                }
                Frame::Array {
                    reference,
                    child,
                    parent,
                    next,
                } => {
                    let cols = match &reference.array {
                        Some(a) => a.cols.max(1) as usize,
                        None => 1,
                    };
                    if *next >= reference.count() {
                        Step::Pop
                    } else {
                        let placement = reference.placement(*next % cols, *next / cols);
                        *next += 1;
                        Step::Place(*child, Transform::cascade(parent, &placement))
                    }
                }
            };
            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Elem(Element::Shape(s), trans) => self.emit(s, &trans),
                Step::Elem(Element::Reference(r), trans) => self.enter(r, &trans),
                Step::Elem(_, _) => (),
                Step::Place(cell, trans) => self.place(cell, trans),
            }
        }
    }
}
