//!
//! # GDSII Import & Export Module
//!

// Std-Lib
use std::path::Path;

// Crates.io
use tracing::{debug, warn};

// Local imports
use crate::{
    data::*,
    error::{ErrorContext, LayoutError, LayoutResult},
    gds21,
    geom::{Path as PathShape, PathEnds, Point, Polygon, Rect, Shape},
    utils::{ContextStack, ErrorHelper},
    Int,
};

impl Layout {
    /// Decode from GDSII bytes, with default [ImportOptions]
    pub fn decode(bytes: &[u8]) -> LayoutResult<Layout> {
        Self::decode_with(bytes, ImportOptions::default())
    }
    /// Decode from GDSII bytes
    pub fn decode_with(bytes: &[u8], opts: ImportOptions) -> LayoutResult<Layout> {
        let lib = gds21::GdsLibrary::from_bytes(bytes)?;
        Self::from_gds(lib, opts)
    }
    /// Open and decode a GDSII file, with default [ImportOptions]
    pub fn open(fname: impl AsRef<Path>) -> LayoutResult<Layout> {
        Self::open_with(fname, ImportOptions::default())
    }
    /// Open and decode a GDSII file
    pub fn open_with(fname: impl AsRef<Path>, opts: ImportOptions) -> LayoutResult<Layout> {
        let lib = gds21::GdsLibrary::open(fname)?;
        Self::from_gds(lib, opts)
    }
    /// Import from a [gds21::GdsLibrary], and validate the resulting hierarchy
    pub fn from_gds(lib: gds21::GdsLibrary, opts: ImportOptions) -> LayoutResult<Layout> {
        debug!(lib = %lib.name, stats = ?lib.stats(), "Importing GDSII library");
        let layout = GdsImporter::import(lib, opts)?;
        layout.validate()?;
        Ok(layout)
    }
    /// Export to a [gds21::GdsLibrary]
    pub fn to_gds(&self) -> LayoutResult<gds21::GdsLibrary> {
        GdsExporter::export(self)
    }
    /// Encode to GDSII bytes
    pub fn encode(&self) -> LayoutResult<Vec<u8>> {
        Ok(self.to_gds()?.to_bytes()?)
    }
    /// Save to GDSII file `fname`
    pub fn save(&self, fname: impl AsRef<Path>) -> LayoutResult<()> {
        Ok(self.to_gds()?.save(fname)?)
    }
}

/// Fill-marker [gds21::GdsProperty]
fn fill_marker() -> gds21::GdsProperty {
    gds21::GdsProperty {
        attr: FILL_MARKER_ATTR,
        value: FILL_MARKER_VALUE.into(),
    }
}
fn is_fill_marker(p: &gds21::GdsProperty) -> bool {
    p.attr == FILL_MARKER_ATTR && p.value == FILL_MARKER_VALUE
}

///
/// # GDSII Importer
///
/// Converts a [gds21::GdsLibrary] into a [Layout].
/// Each imported element retains its [gds21::GdsElement] as its [Origin].
///
#[derive(Debug, Default)]
pub struct GdsImporter {
    opts: ImportOptions,
    ctx_stack: Vec<ErrorContext>,
}
impl GdsImporter {
    /// Create an importer, e.g. for converting individual elements
    pub fn new(opts: ImportOptions) -> Self {
        Self {
            opts,
            ctx_stack: Vec::new(),
        }
    }
    /// Import a [gds21::GdsLibrary] into a [Layout]
    pub fn import(lib: gds21::GdsLibrary, opts: ImportOptions) -> LayoutResult<Layout> {
        let mut importer = Self::new(opts);
        importer.within(ErrorContext::Library(lib.name.clone()), |imp| {
            imp.import_lib(lib)
        })
    }
    /// Internal implementation method. Convert all, starting from our top-level [gds21::GdsLibrary].
    fn import_lib(&mut self, lib: gds21::GdsLibrary) -> LayoutResult<Layout> {
        let gds21::GdsLibrary {
            name,
            version,
            dates,
            units,
            structs,
            passthrough,
            trailer,
        } = lib;
        let units = self.within(ErrorContext::Units, |imp| imp.import_units(units))?;
        let mut layout = Layout::new(name, units);
        layout.meta = LayoutMeta {
            version,
            dates,
            passthrough,
            trailer,
        };
        for strukt in structs {
            let cell = self.within(ErrorContext::Cell(strukt.name.clone()), |imp| {
                imp.import_cell(strukt)
            })?;
            if layout.cells.contains_key(&cell.name) {
                return self.fail(format!("Duplicate cell name `{}`", cell.name));
            }
            layout.cells.insert(cell.name.clone(), cell);
        }
        layout.options = self.opts.clone();
        Ok(layout)
    }
    fn import_units(&mut self, units: gds21::GdsUnits) -> LayoutResult<Units> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        self.assert(
            valid(units.user) && valid(units.meters),
            format!("Invalid units: {} user, {} meters", units.user, units.meters),
        )?;
        Ok(units.into())
    }
    fn import_cell(&mut self, strukt: gds21::GdsStruct) -> LayoutResult<Cell> {
        let mut cell = Cell::new(strukt.name);
        cell.dates = strukt.dates;
        cell.elems.reserve(strukt.elems.len());
        for elem in strukt.elems {
            let mut e = self.import_element(&elem)?;
            match &mut e {
                Element::Shape(s) => s.origin = Origin::new(elem),
                Element::Reference(r) => r.origin = Origin::new(elem),
                _ => (),
            }
            cell.elems.push(e);
        }
        Ok(cell)
    }
    /// Import a single [gds21::GdsElement]. The result has no [Origin].
    pub fn import_element(&mut self, elem: &gds21::GdsElement) -> LayoutResult<Element> {
        use gds21::GdsElement::*;
        match elem {
            GdsBoundary(x) => self.within(ErrorContext::Geometry, |imp| imp.import_boundary(x)),
            GdsPath(x) => self.within(ErrorContext::Geometry, |imp| imp.import_path(x)),
            GdsBox(x) => self.within(ErrorContext::Geometry, |imp| imp.import_box(x)),
            GdsStructRef(x) => self.within(ErrorContext::Instance(x.name.clone()), |imp| {
                imp.import_struct_ref(x)
            }),
            GdsArrayRef(x) => self.within(ErrorContext::Array(x.name.clone()), |imp| {
                imp.import_array_ref(x)
            }),
            GdsTextElem(x) => Ok(Element::Text(x.clone())),
            GdsNode(x) => Ok(Element::Node(x.clone())),
            GdsOpaque(x) => Ok(Element::Opaque(x.clone())),
        }
    }
    /// Tag and properties for a shape on `layer`. The fill marker is stripped from the properties.
    fn import_tag(&self, layer: Layer, props: &[gds21::GdsProperty]) -> (Tag, Vec<gds21::GdsProperty>) {
        let marked = props.iter().any(is_fill_marker);
        let props: Vec<_> = props.iter().filter(|p| !is_fill_marker(p)).cloned().collect();
        let tag = if marked || self.opts.fill_layers.contains(&layer) {
            Tag::Fill
        } else {
            Tag::Design
        };
        (tag, props)
    }
    fn import_boundary(&mut self, x: &gds21::GdsBoundary) -> LayoutResult<Element> {
        let mut pts = import_points(&x.xy);
        // Pop the redundant closing point
        if pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        self.assert(pts.len() >= 3, "Boundary with fewer than three vertices")?;
        let shape = match crate::clip::rect_of(&pts) {
            Some(r) => Shape::Rect(r.into()),
            None => Shape::Polygon(Polygon { points: pts }),
        };
        let layer = Layer::new(x.layer, x.datatype);
        let (tag, props) = self.import_tag(layer, &x.properties);
        Ok(Element::Shape(ShapeElem {
            layer,
            tag,
            shape,
            props,
            origin: Origin::default(),
        }))
    }
    fn import_box(&mut self, x: &gds21::GdsBox) -> LayoutResult<Element> {
        // Bounding box of all five points
        let pts = import_points(&x.xy);
        let (mut p0, mut p1) = (pts[0], pts[0]);
        for p in &pts {
            p0 = Point::new(p0.x.min(p.x), p0.y.min(p.y));
            p1 = Point::new(p1.x.max(p.x), p1.y.max(p.y));
        }
        let layer = Layer::new(x.layer, x.boxtype);
        let (tag, props) = self.import_tag(layer, &x.properties);
        Ok(Element::Shape(ShapeElem {
            layer,
            tag,
            shape: Shape::Rect(Rect::new(p0, p1)),
            props,
            origin: Origin::default(),
        }))
    }
    fn import_path(&mut self, x: &gds21::GdsPath) -> LayoutResult<Element> {
        let points = import_points(&x.xy);
        self.assert(!points.is_empty(), "Path without points")?;
        let width = x.width.unwrap_or(0);
        if width < 0 {
            // Negative widths are absolute, i.e. not scaled by magnification
            warn!(width, "absolute path width applied as relative");
        }
        let width = width.abs() as Int;
        let ends = match x.path_type.unwrap_or(0) {
            0 => PathEnds::Flush,
            1 => PathEnds::Round,
            2 => PathEnds::HalfWidth,
            4 => PathEnds::Custom {
                begin: x.begin_extn.unwrap_or(0) as Int,
                end: x.end_extn.unwrap_or(0) as Int,
            },
            t => return self.fail(format!("Unsupported path type {}", t)),
        };
        let layer = Layer::new(x.layer, x.datatype);
        let (tag, props) = self.import_tag(layer, &x.properties);
        Ok(Element::Shape(ShapeElem {
            layer,
            tag,
            shape: Shape::Path(PathShape {
                points,
                width,
                ends,
            }),
            props,
            origin: Origin::default(),
        }))
    }
    /// Apply [gds21::GdsStrans] settings to `r`
    fn import_strans(&mut self, r: &mut Reference, strans: &Option<gds21::GdsStrans>) -> LayoutResult<()> {
        let strans = match strans {
            Some(s) => s,
            None => return Ok(()),
        };
        r.reflect = strans.reflected;
        r.angle = strans.angle.unwrap_or(0.0);
        r.mag = strans.mag.unwrap_or(1.0);
        r.abs_angle = strans.abs_angle;
        r.abs_mag = strans.abs_mag;
        if strans.abs_angle || strans.abs_mag {
            warn!(cell = %r.cell, "absolute angle or magnification applied as relative");
        }
        self.assert(
            r.mag.is_finite() && r.mag > 0.0,
            format!("Invalid magnification {}", r.mag),
        )?;
        self.assert(r.angle.is_finite(), "Invalid angle")?;
        Ok(())
    }
    fn import_struct_ref(&mut self, x: &gds21::GdsStructRef) -> LayoutResult<Element> {
        let mut r = Reference::new(x.name.clone(), import_point(&x.xy));
        self.import_strans(&mut r, &x.strans)?;
        r.props = x.properties.clone();
        Ok(Element::Reference(r))
    }
    fn import_array_ref(&mut self, x: &gds21::GdsArrayRef) -> LayoutResult<Element> {
        self.assert(
            x.cols > 0 && x.rows > 0,
            format!("Invalid array dimensions {}x{}", x.cols, x.rows),
        )?;
        let mut r = Reference::new(x.name.clone(), import_point(&x.xy[0]));
        self.import_strans(&mut r, &x.strans)?;
        r.array = Some(ArraySpec {
            cols: x.cols,
            rows: x.rows,
            col_corner: import_point(&x.xy[1]),
            row_corner: import_point(&x.xy[2]),
        });
        r.props = x.properties.clone();
        Ok(Element::Reference(r))
    }
}
impl ErrorHelper for GdsImporter {
    type Error = LayoutError;
    fn err(&self, msg: impl Into<String>) -> LayoutError {
        LayoutError::Import {
            message: msg.into(),
            stack: self.ctx_stack.clone(),
        }
    }
}
impl ContextStack for GdsImporter {
    fn stack(&mut self) -> &mut Vec<ErrorContext> {
        &mut self.ctx_stack
    }
}
fn import_point(p: &gds21::GdsPoint) -> Point {
    Point::new(p.x as Int, p.y as Int)
}
fn import_points(pts: &[gds21::GdsPoint]) -> Vec<Point> {
    pts.iter().map(import_point).collect()
}

///
/// # GDSII Exporter
///
/// Converts a [Layout] into a [gds21::GdsLibrary].
/// Elements equal to their [Origin] re-export it unchanged.
/// Everything else is freshly converted.
///
#[derive(Debug)]
pub struct GdsExporter<'l> {
    layout: &'l Layout,
    /// Re-imports origins, to check whether elements have changed
    importer: GdsImporter,
    ctx_stack: Vec<ErrorContext>,
}
impl<'l> GdsExporter<'l> {
    pub fn export(layout: &'l Layout) -> LayoutResult<gds21::GdsLibrary> {
        let mut exporter = Self {
            layout,
            importer: GdsImporter::new(layout.options.clone()),
            ctx_stack: Vec::new(),
        };
        exporter.within(ErrorContext::Library(layout.name.clone()), |exp| {
            exp.export_lib()
        })
    }
    fn export_lib(&mut self) -> LayoutResult<gds21::GdsLibrary> {
        let layout = self.layout;
        let mut lib = gds21::GdsLibrary::new(&layout.name);
        lib.version = layout.meta.version;
        lib.dates = layout.meta.dates.clone();
        lib.units = layout.units.gds().clone();
        lib.passthrough = layout.meta.passthrough.clone();
        lib.trailer = layout.meta.trailer.clone();
        for cell in layout.cells.values() {
            let strukt =
                self.within(ErrorContext::Cell(cell.name.clone()), |exp| exp.export_cell(cell))?;
            lib.structs.push(strukt);
        }
        Ok(lib)
    }
    fn export_cell(&mut self, cell: &Cell) -> LayoutResult<gds21::GdsStruct> {
        let mut strukt = gds21::GdsStruct::new(&cell.name);
        strukt.dates = cell.dates.clone();
        strukt.elems.reserve(cell.elems.len());
        for elem in &cell.elems {
            strukt.elems.push(self.export_element(elem)?);
        }
        Ok(strukt)
    }
    /// Export an [Element], re-using its [Origin] if unchanged
    pub fn export_element(&mut self, elem: &Element) -> LayoutResult<gds21::GdsElement> {
        let origin = match elem {
            Element::Shape(s) => s.origin.get(),
            Element::Reference(r) => r.origin.get(),
            Element::Text(x) => return Ok(x.clone().into()),
            Element::Node(x) => return Ok(x.clone().into()),
            Element::Opaque(x) => return Ok(x.clone().into()),
        };
        if let Some(origin) = origin {
            // Origins which no longer import are treated as changed
            if let Ok(reimported) = self.importer.import_element(origin) {
                if reimported == *elem {
                    return Ok(origin.clone());
                }
            }
            self.importer.stack().clear();
        }
        match elem {
            Element::Shape(s) => self.within(ErrorContext::Geometry, |exp| exp.export_shape(s)),
            Element::Reference(r) => self.within(ErrorContext::Instance(r.cell.clone()), |exp| {
                exp.export_reference(r)
            }),
            _ => self.fail("Internal error: unhandled element"),
        }
    }
    fn export_shape(&mut self, s: &ShapeElem) -> LayoutResult<gds21::GdsElement> {
        let mut properties = s.props.clone();
        if s.tag == Tag::Fill {
            properties.push(fill_marker());
        }
        let Layer { num, datatype } = s.layer;
        let elem: gds21::GdsElement = match &s.shape {
            Shape::Rect(r) => {
                let pts = [
                    r.p0,
                    Point::new(r.p1.x, r.p0.y),
                    r.p1,
                    Point::new(r.p0.x, r.p1.y),
                    r.p0,
                ];
                gds21::GdsBoundary {
                    layer: num,
                    datatype,
                    xy: self.export_points(&pts)?,
                    properties,
                    ..Default::default()
                }
                .into()
            }
            Shape::Polygon(p) => {
                let mut pts = p.points.clone();
                if let Some(first) = pts.first().copied() {
                    pts.push(first);
                }
                gds21::GdsBoundary {
                    layer: num,
                    datatype,
                    xy: self.export_points(&pts)?,
                    properties,
                    ..Default::default()
                }
                .into()
            }
            Shape::Path(p) => {
                let (path_type, begin_extn, end_extn) = match p.ends {
                    PathEnds::Flush => (None, None, None),
                    PathEnds::Round => (Some(1), None, None),
                    PathEnds::HalfWidth => (Some(2), None, None),
                    PathEnds::Custom { begin, end } => (
                        Some(4),
                        Some(self.export_int(begin)?),
                        Some(self.export_int(end)?),
                    ),
                };
                gds21::GdsPath {
                    layer: num,
                    datatype,
                    xy: self.export_points(&p.points)?,
                    width: Some(self.export_int(p.width)?),
                    path_type,
                    begin_extn,
                    end_extn,
                    properties,
                    ..Default::default()
                }
                .into()
            }
        };
        Ok(elem)
    }
    fn export_reference(&mut self, r: &Reference) -> LayoutResult<gds21::GdsElement> {
        let strans = if r.reflect || r.angle != 0.0 || r.mag != 1.0 || r.abs_angle || r.abs_mag {
            Some(gds21::GdsStrans {
                reflected: r.reflect,
                abs_mag: r.abs_mag,
                abs_angle: r.abs_angle,
                mag: if r.mag != 1.0 { Some(r.mag) } else { None },
                angle: if r.angle != 0.0 { Some(r.angle) } else { None },
            })
        } else {
            None
        };
        let xy = self.export_point(&r.loc)?;
        let elem: gds21::GdsElement = match &r.array {
            None => gds21::GdsStructRef {
                name: r.cell.clone(),
                xy,
                strans,
                properties: r.props.clone(),
                ..Default::default()
            }
            .into(),
            Some(a) => gds21::GdsArrayRef {
                name: r.cell.clone(),
                xy: [
                    xy,
                    self.export_point(&a.col_corner)?,
                    self.export_point(&a.row_corner)?,
                ],
                cols: a.cols,
                rows: a.rows,
                strans,
                properties: r.props.clone(),
                ..Default::default()
            }
            .into(),
        };
        Ok(elem)
    }
    fn export_int(&self, i: Int) -> LayoutResult<i32> {
        i32::try_from(i).or_else(|_| self.fail(format!("Value {} out of GDSII range", i)))
    }
    fn export_point(&self, p: &Point) -> LayoutResult<gds21::GdsPoint> {
        Ok(gds21::GdsPoint::new(self.export_int(p.x)?, self.export_int(p.y)?))
    }
    fn export_points(&self, pts: &[Point]) -> LayoutResult<Vec<gds21::GdsPoint>> {
        pts.iter().map(|p| self.export_point(p)).collect()
    }
}
impl ErrorHelper for GdsExporter<'_> {
    type Error = LayoutError;
    fn err(&self, msg: impl Into<String>) -> LayoutError {
        LayoutError::Export {
            message: msg.into(),
            stack: self.ctx_stack.clone(),
        }
    }
}
impl ContextStack for GdsExporter<'_> {
    fn stack(&mut self) -> &mut Vec<ErrorContext> {
        &mut self.ctx_stack
    }
}
