//!
//! # Raw Layout Data Model
//!
//! [Layout]s hold named [Cell]s, which hold [Element]s.
//! Geometric elements are [ShapeElem]s, each on a [Layer] and carrying a [Tag]
//! distinguishing design content from generated fill.
//!

// Std-Lib
use std::collections::{BTreeSet, HashSet};

// Crates.io
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// Local imports
use crate::{
    error::{HierarchyError, LayoutError, LayoutResult},
    geom::{Point, Shape, Transform},
    gds21::{
        GdsDateTimes, GdsElement, GdsNode, GdsOpaque, GdsPassthrough, GdsProperty, GdsTextElem,
        GdsUnits,
    },
    utils::DepOrder,
};

/// Property attribute number marking generated fill
pub const FILL_MARKER_ATTR: i16 = 126;
/// Property value marking generated fill
pub const FILL_MARKER_VALUE: &str = "fill21";

/// # Layer
/// GDSII layer number and datatype pair.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Layer {
    pub num: i16,
    pub datatype: i16,
}
impl Layer {
    pub fn new(num: i16, datatype: i16) -> Self {
        Self { num, datatype }
    }
}
impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.datatype)
    }
}

/// # Shape Tag
/// Whether a shape is part of the design, or fill generated for density.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tag {
    #[default]
    Design,
    Fill,
}

/// # Distance Units
///
/// All coordinates are integer database units.
/// Retains the GDSII encodings of both unit values.
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Units(GdsUnits);
impl Units {
    /// Create from the database-unit size in user units, and in meters
    pub fn new(user: f64, meters: f64) -> Self {
        Self(GdsUnits::new(user, meters))
    }
    /// Database-unit size, in meters
    pub fn db_to_meter(&self) -> f64 {
        self.0.meters
    }
    /// Number of database units per user unit
    pub fn user_to_db(&self) -> f64 {
        1.0 / self.0.user
    }
    /// The underlying [GdsUnits]
    pub fn gds(&self) -> &GdsUnits {
        &self.0
    }
}
impl From<GdsUnits> for Units {
    fn from(u: GdsUnits) -> Self {
        Self(u)
    }
}

///
/// # Element Origin
///
/// The [GdsElement] an element was imported from, if any.
/// Exports re-use it, source bytes and all, for as long as the element remains unchanged.
/// Never affects equality.
///
#[derive(Debug, Clone, Default)]
pub struct Origin(Option<Box<GdsElement>>);
impl Origin {
    pub fn new(elem: GdsElement) -> Self {
        Self(Some(Box::new(elem)))
    }
    pub fn get(&self) -> Option<&GdsElement> {
        self.0.as_deref()
    }
}
impl PartialEq for Origin {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// # Shape Element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShapeElem {
    pub layer: Layer,
    pub tag: Tag,
    pub shape: Shape,
    /// Properties, other than the fill marker
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<GdsProperty>,
    #[serde(skip)]
    pub origin: Origin,
}
impl ShapeElem {
    pub fn new(layer: Layer, tag: Tag, shape: impl Into<Shape>) -> Self {
        Self {
            layer,
            tag,
            shape: shape.into(),
            ..Default::default()
        }
    }
}

/// # Array Specification
/// Column and row counts, and the reference's location displaced by all columns and by all rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArraySpec {
    pub cols: i16,
    pub rows: i16,
    pub col_corner: Point,
    pub row_corner: Point,
}

///
/// # Cell Reference
///
/// A placement of cell `cell`, or an array of placements if `array` is set.
/// Each placement reflects about the x-axis (if `reflect`), magnifies by `mag`,
/// rotates by `angle` degrees, and then translates.
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub cell: String,
    pub loc: Point,
    pub reflect: bool,
    pub angle: f64,
    pub mag: f64,
    /// Absolute-angle and absolute-magnification flags.
    /// Retained for export, but applied as relative.
    pub abs_angle: bool,
    pub abs_mag: bool,
    pub array: Option<ArraySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<GdsProperty>,
    #[serde(skip)]
    pub origin: Origin,
}
impl Reference {
    /// Create a single, untransformed placement of `cell` at `loc`
    pub fn new(cell: impl Into<String>, loc: Point) -> Self {
        Self {
            cell: cell.into(),
            loc,
            reflect: false,
            angle: 0.0,
            mag: 1.0,
            abs_angle: false,
            abs_mag: false,
            array: None,
            props: Vec::new(),
            origin: Origin::default(),
        }
    }
    /// Number of placements
    pub fn count(&self) -> usize {
        match &self.array {
            None => 1,
            Some(a) => a.cols.max(0) as usize * a.rows.max(0) as usize,
        }
    }
    /// Transform of the first (or only) placement
    pub fn transform(&self) -> Transform {
        Transform::from_instance(&self.loc, self.reflect, self.angle, self.mag)
    }
    /// Transform of the placement at (`col`, `row`). Non-arrays have only (0, 0).
    pub fn placement(&self, col: usize, row: usize) -> Transform {
        let mut trans = self.transform();
        if let Some(a) = &self.array {
            let (cols, rows) = (a.cols.max(1) as f64, a.rows.max(1) as f64);
            let (c, r) = (col as f64, row as f64);
            trans.b[0] += c * (a.col_corner.x - self.loc.x) as f64 / cols
                + r * (a.row_corner.x - self.loc.x) as f64 / rows;
            trans.b[1] += c * (a.col_corner.y - self.loc.y) as f64 / cols
                + r * (a.row_corner.y - self.loc.y) as f64 / rows;
        }
        trans
    }
    /// Transforms of the corner placements, in (col, row) order.
    /// Every placement's offset lies within their hull.
    pub fn corner_placements(&self) -> Vec<Transform> {
        match &self.array {
            None => vec![self.transform()],
            Some(a) => {
                let (lc, lr) = ((a.cols.max(1) - 1) as usize, (a.rows.max(1) - 1) as usize);
                vec![
                    self.placement(0, 0),
                    self.placement(lc, 0),
                    self.placement(0, lr),
                    self.placement(lc, lr),
                ]
            }
        }
    }
}

/// # Element Enumeration
/// Everything a [Cell] can hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Element {
    Shape(ShapeElem),
    Reference(Reference),
    /// Text labels, carried as read
    Text(GdsTextElem),
    /// Nodes, carried as read
    Node(GdsNode),
    /// Uninterpreted records, carried as read
    Opaque(GdsOpaque),
}
impl From<ShapeElem> for Element {
    fn from(e: ShapeElem) -> Self {
        Self::Shape(e)
    }
}
impl From<Reference> for Element {
    fn from(e: Reference) -> Self {
        Self::Reference(e)
    }
}

/// # Cell Definition
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    pub name: String,
    pub dates: GdsDateTimes,
    pub elems: Vec<Element>,
}
impl Cell {
    /// Create a new and empty [Cell]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Iterate over all our [ShapeElem]s
    pub fn all_shapes(&self) -> impl Iterator<Item = &ShapeElem> {
        self.elems.iter().filter_map(|e| match e {
            Element::Shape(s) => Some(s),
            _ => None,
        })
    }
    /// Iterate over our [ShapeElem]s on `layer`
    pub fn shapes(&self, layer: Layer) -> impl Iterator<Item = &ShapeElem> {
        self.all_shapes().filter(move |s| s.layer == layer)
    }
    /// Iterate over our [Reference]s
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.elems.iter().filter_map(|e| match e {
            Element::Reference(r) => Some(r),
            _ => None,
        })
    }
    /// Remove all [ShapeElem]s for which `pred` is true.
    /// Returns the number removed. Other elements keep their order.
    pub fn remove_shapes(&mut self, mut pred: impl FnMut(&ShapeElem) -> bool) -> usize {
        let before = self.elems.len();
        self.elems.retain(|e| match e {
            Element::Shape(s) => !pred(s),
            _ => true,
        });
        before - self.elems.len()
    }
}

/// # Library-Level Metadata
/// Retained from import for re-export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutMeta {
    /// GDSII stream version
    pub version: i16,
    pub dates: GdsDateTimes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passthrough: Vec<GdsPassthrough>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trailer: Vec<u8>,
}
impl Default for LayoutMeta {
    fn default() -> Self {
        Self {
            version: 600,
            dates: GdsDateTimes::default(),
            passthrough: Vec::new(),
            trailer: Vec::new(),
        }
    }
}

/// # Import Options
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportOptions {
    /// Layers on which all shapes are tagged [Tag::Fill], marker or not.
    /// Used to adopt fill written by other tools.
    #[serde(default)]
    pub fill_layers: Vec<Layer>,
}

///
/// # Layout
///
/// The primary raw-layout object: a set of named [Cell]s and their shared [Units].
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Layout {
    pub name: String,
    pub units: Units,
    /// Cell definitions, in definition order
    pub cells: IndexMap<String, Cell>,
    pub meta: LayoutMeta,
    /// Options this layout was imported with
    #[serde(skip)]
    pub options: ImportOptions,
}
impl Layout {
    /// Create a new and empty [Layout]
    pub fn new(name: impl Into<String>, units: Units) -> Self {
        Self {
            name: name.into(),
            units,
            ..Default::default()
        }
    }
    /// Add a [Cell]. Fails if its name is already defined.
    pub fn add_cell(&mut self, cell: Cell) -> LayoutResult<()> {
        if self.cells.contains_key(&cell.name) {
            return LayoutError::fail(format!("Duplicate cell name `{}`", cell.name));
        }
        self.cells.insert(cell.name.clone(), cell);
        Ok(())
    }
    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }
    fn cell_mut_or_err(&mut self, name: &str) -> LayoutResult<&mut Cell> {
        self.cells
            .get_mut(name)
            .ok_or_else(|| LayoutError::msg(format!("Undefined cell `{}`", name)))
    }
    /// Insert `shape` into `cell`, on `layer`, tagged `tag`
    pub fn insert_shape(
        &mut self,
        cell: &str,
        layer: Layer,
        tag: Tag,
        shape: impl Into<Shape>,
    ) -> LayoutResult<()> {
        let cell = self.cell_mut_or_err(cell)?;
        cell.elems.push(ShapeElem::new(layer, tag, shape).into());
        Ok(())
    }
    /// Remove shapes on `layer` of `cell` for which `pred` is true. Returns the number removed.
    pub fn remove_shapes(
        &mut self,
        cell: &str,
        layer: Layer,
        mut pred: impl FnMut(&ShapeElem) -> bool,
    ) -> LayoutResult<usize> {
        let cell = self.cell_mut_or_err(cell)?;
        Ok(cell.remove_shapes(|s| s.layer == layer && pred(s)))
    }
    /// All layers with shapes, in any cell
    pub fn layers(&self) -> BTreeSet<Layer> {
        self.cells
            .values()
            .flat_map(|c| c.all_shapes().map(|s| s.layer))
            .collect()
    }
    /// Names of cells which no other cell references, in definition order
    pub fn roots(&self) -> Vec<&str> {
        let referenced: HashSet<&str> = self
            .cells
            .values()
            .flat_map(|c| c.references().map(|r| r.cell.as_str()))
            .collect();
        self.cells
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !referenced.contains(k))
            .collect()
    }
    /// The top-level cell: the first which no other references.
    /// Generated shapes are inserted here.
    pub fn top_cell(&self) -> Option<&str> {
        self.roots().into_iter().next()
    }
    /// All cell names, ordered such that each cell follows every cell it references
    pub fn dep_order(&self) -> Result<Vec<&str>, HierarchyError> {
        let all: Vec<&str> = self.cells.keys().map(|k| k.as_str()).collect();
        Hierarchy(self).order(&all)
    }
    /// Check the cell hierarchy: every reference names a defined cell, and no cell
    /// instantiates itself, directly or indirectly.
    pub fn validate(&self) -> LayoutResult<()> {
        self.dep_order()?;
        Ok(())
    }
}

/// Cell-hierarchy walker, for dependency ordering
struct Hierarchy<'a>(&'a Layout);
impl<'a> DepOrder for Hierarchy<'a> {
    type Item = &'a str;
    type Error = HierarchyError;

    fn dependencies(&self, item: &&'a str) -> Result<Vec<&'a str>, HierarchyError> {
        let layout: &'a Layout = self.0;
        let cell = match layout.cells.get(*item) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        let mut deps = Vec::new();
        for r in cell.references() {
            if r.cell == cell.name {
                return Err(HierarchyError::SelfReference {
                    cell: cell.name.clone(),
                });
            }
            match layout.cells.get_key_value(&r.cell) {
                Some((name, _)) => deps.push(name.as_str()),
                None => {
                    return Err(HierarchyError::UndefinedCell {
                        cell: r.cell.clone(),
                        parent: cell.name.clone(),
                    })
                }
            }
        }
        Ok(deps)
    }
    fn cycle(&self, item: &&'a str) -> HierarchyError {
        HierarchyError::Cycle {
            cell: item.to_string(),
        }
    }
}
