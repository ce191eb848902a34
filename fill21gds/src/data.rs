//!
//! # Fill21 GDSII Data Model
//!

// Std-Lib Imports
use std::error::Error;
use std::io::Write;
use std::path::Path;

// Crates.io
use chrono::{Datelike, NaiveDate, NaiveDateTime, SubsecRound, Timelike, Utc};
use derive_builder::Builder;
use derive_more::{self, Add, AddAssign, Sub, SubAssign};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

// Workspace Imports
use fill21utils::SerdeFile;

// Local Imports
use crate::read::GdsParser;
use crate::write::GdsWriter;

/// GDSII versions accepted by the reader.
/// Version 600 is the common encoding of "6.0.0".
pub const ACCEPTED_VERSIONS: [i16; 7] = [0, 3, 4, 5, 6, 7, 600];

///
/// # Gds Record Types
///
/// Numbered as in the GDSII stream format, for [FromPrimitive] conversion of the header byte.
///
#[derive(FromPrimitive, Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum GdsRecordType {
    Header = 0x00,
    BgnLib,
    LibName,
    Units,
    EndLib,
    BgnStruct,
    StructName, // STRNAME
    EndStruct,
    Boundary,
    Path,
    StructRef,
    ArrayRef,
    Text,
    Layer,
    DataType,
    Width,
    Xy,
    EndElement,
    StructRefName, // SNAME
    ColRow,
    TextNode,
    Node,
    TextType,
    Presentation,
    Spacing,
    String,
    Strans,
    Mag,
    Angle,
    Uinteger,
    Ustring,
    RefLibs,
    Fonts,
    PathType,
    Generations,
    AttrTable,
    StypTable,
    StrType,
    ElemFlags,
    ElemKey,
    LinkType,
    LinkKeys,
    Nodetype,
    PropAttr,
    PropValue,
    Box,
    BoxType,
    Plex,
    BeginExtn,
    EndExtn,
    TapeNum,
    TapeCode,
    StrClass,
    Reserved,
    Format,
    Mask,
    EndMasks,
    LibDirSize,
    SrfName,
    LibSecur,
}
impl GdsRecordType {
    /// Decode a record-type byte.
    /// Returns `None` for values outside the enumeration and for record types
    /// which are discontinued, unreleased, or reserved. Those are carried as [GdsRecord::Unknown].
    pub fn decode(byte: u8) -> Option<Self> {
        let rtype: Self = FromPrimitive::from_u8(byte)?;
        if rtype.valid() {
            Some(rtype)
        } else {
            None
        }
    }
    /// Boolean indication of interpreted record types
    pub fn valid(&self) -> bool {
        !matches!(
            self,
            Self::TextNode
                | Self::Spacing
                | Self::Uinteger
                | Self::Ustring
                | Self::StypTable
                | Self::StrType
                | Self::ElemKey
                | Self::LinkType
                | Self::LinkKeys
                | Self::StrClass
                | Self::Reserved
        )
    }
}

/// # Gds DataType Enumeration
/// Numbered as in the second header byte of each record
#[derive(FromPrimitive, Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum GdsDataType {
    NoData = 0,
    BitArray = 1,
    I16 = 2,
    I32 = 3,
    F32 = 4,
    F64 = 5,
    Str = 6,
}

/// # Gds Record Header
/// The four header bytes of each record, as read: total length, record-type and data-type.
/// `len` here excludes the header bytes themselves.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsRecordHeader {
    pub rtype: u8,
    pub dtype: u8,
    pub len: u16,
}

///
/// # Gds Record Enumeration
///
/// Records in close-to-binary form: data-types are checked,
/// and single-entry arrays become scalars.
///
/// Records of types this library does not interpret are retained as [GdsRecord::Unknown],
/// with their raw header bytes and content.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GdsRecord {
    Header { version: i16 },
    BgnLib { dates: Vec<i16> },
    LibName(String),
    /// Raw eight-byte encodings of the two [GdsUnits] numbers
    Units(u64, u64),
    EndLib,
    BgnStruct { dates: Vec<i16> },
    StructName(String),    // STRNAME Record
    StructRefName(String), // SNAME Record
    EndStruct,
    Boundary,
    Path,
    StructRef,
    ArrayRef,
    Text,
    Layer(i16),
    DataType(i16),
    Width(i32),
    Xy(Vec<i32>),
    EndElement,
    ColRow { cols: i16, rows: i16 },
    Node,
    TextType(i16),
    Presentation(u8, u8),
    String(String),
    Strans(u8, u8),
    Mag(f64),
    Angle(f64),
    RefLibs(String),
    Fonts(String),
    PathType(i16),
    Generations(i16),
    AttrTable(String),
    ElemFlags(u8, u8),
    Nodetype(i16),
    PropAttr(i16),
    PropValue(String),
    Box,
    BoxType(i16),
    Plex(i32),
    BeginExtn(i32),
    EndExtn(i32),
    TapeNum(i16),
    TapeCode(Vec<i16>),
    Format(i16),
    Mask(String),
    EndMasks,
    LibDirSize(i16),
    SrfName(String),
    LibSecur(i16),
    /// Uninterpreted record
    Unknown { rtype: u8, dtype: u8, data: Vec<u8> },
}

/// # Gds Floating Point
///
/// GDSII predates IEEE754, and stores its reals as excess-64, base-16 floats:
/// a sign bit, a seven-bit exponent, and a 56-bit mantissa in the range [1/16, 1).
///
/// [GdsFloat64] holds no data. It namespaces conversions between that format and `f64`.
///
pub struct GdsFloat64;
impl GdsFloat64 {
    /// Decode GDSII's eight bytes, stored as a `u64`, to `f64`
    pub fn decode(val: u64) -> f64 {
        let neg = (val & 0x8000_0000_0000_0000) != 0;
        let exp: i32 = ((val & 0x7F00_0000_0000_0000) >> (8 * 7)) as i32 - 64;
        let mantissa: u64 = val & 0x00FF_FFFF_FFFF_FFFF;
        let mantissa: f64 = mantissa as f64 / 2f64.powi(8 * 7);
        if neg {
            -mantissa * 16f64.powi(exp)
        } else {
            mantissa * 16f64.powi(exp)
        }
    }
    /// Encode `f64` to GDSII's eight bytes, stored as `u64`
    pub fn encode(mut val: f64) -> u64 {
        if val == 0.0 {
            return 0;
        };
        let mut top: u8 = 0;
        if val < 0.0 {
            top = 0x80;
            val = -val;
        }
        let fexp: f64 = 0.25 * val.log2();
        let mut exponent = fexp.ceil() as i32;
        if fexp == fexp.ceil() {
            exponent += 1;
        }
        let mantissa: u64 = (val * 16_f64.powi(14 - exponent)).round() as u64;
        top += (64 + exponent) as u8;
        (top as u64).wrapping_shl(56) | (mantissa & 0x00FF_FFFF_FFFF_FFFF)
    }
}

/// # Gds Source Bytes
///
/// The encoded records an element was decoded from, if any.
/// Writers re-emit them verbatim while they still decode to an equal element,
/// which keeps unmodified elements byte-identical through a read-write cycle,
/// including any uninterpreted records inside them.
///
/// Comparisons always succeed, so elements compare by content alone.
/// Never serialized.
#[derive(Default, Clone, Debug)]
pub struct GdsSource(pub Option<Vec<u8>>);
impl GdsSource {
    pub fn new(bytes: &[u8]) -> Self {
        Self(Some(bytes.to_vec()))
    }
    pub fn bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }
}
impl PartialEq for GdsSource {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// # Gds Translation Settings
/// Reflection, rotation, and magnification for text-elements and references.
/// As configured by `STRANS` records.
#[derive(Default, Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GdsStrans {
    /// Reflection about the x-axis, applied before rotation
    #[serde(default, skip_serializing_if = "is_false")]
    pub reflected: bool,
    /// Absolute Magnification Setting
    #[serde(default, skip_serializing_if = "is_false")]
    pub abs_mag: bool,
    /// Absolute Angle Setting
    #[serde(default, skip_serializing_if = "is_false")]
    pub abs_angle: bool,
    /// Magnification Factor. Unity if not specified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag: Option<f64>,
    /// Angle, in degrees counter-clockwise. Zero if not specified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

/// # Gds Text-Presentation Flags
/// Font and justification bits, stored raw.
#[derive(Default, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GdsPresentation(pub u8, pub u8);

/// # Gds Element Flags
/// Two bytes of `ELFLAGS` bit-fields, stored raw.
#[derive(Default, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GdsElemFlags(pub u8, pub u8);

/// # Gds Plex Number
#[derive(Default, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GdsPlex(pub i32);

/// # Gds Library Units
///
/// The `UNITS` record holds two numbers:
/// the size of a database unit in user units, and the size of a database unit in meters.
/// All coordinates in the library are in database units.
///
/// Their eight-byte encodings are retained as read.
/// Several encodings can decode to the same `f64`, and writers reuse the originals
/// as long as the values are unchanged.
///
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GdsUnits {
    /// Database unit, in user units
    pub user: f64,
    /// Database unit, in meters
    pub meters: f64,
    /// Encodings as read
    #[serde(skip)]
    bits: Option<(u64, u64)>,
}
impl GdsUnits {
    /// Create a new [GdsUnits]
    pub fn new(user: f64, meters: f64) -> Self {
        Self {
            user,
            meters,
            bits: None,
        }
    }
    /// Create from the raw eight-byte encodings of a `UNITS` record
    pub fn from_bits(user: u64, meters: u64) -> Self {
        Self {
            user: GdsFloat64::decode(user),
            meters: GdsFloat64::decode(meters),
            bits: Some((user, meters)),
        }
    }
    /// Eight-byte encodings for writing.
    /// The retained encodings if they still match our values, otherwise freshly encoded.
    pub fn to_bits(&self) -> (u64, u64) {
        match self.bits {
            Some((u, m))
                if GdsFloat64::decode(u) == self.user && GdsFloat64::decode(m) == self.meters =>
            {
                (u, m)
            }
            _ => (
                GdsFloat64::encode(self.user),
                GdsFloat64::encode(self.meters),
            ),
        }
    }
    /// Get the database-unit size, in meters
    pub fn db_unit(&self) -> f64 {
        self.meters
    }
    /// Get the user-unit size, in meters
    pub fn user_unit(&self) -> f64 {
        self.meters / self.user
    }
}
impl PartialEq for GdsUnits {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.meters == other.meters
    }
}
impl Default for GdsUnits {
    /// 1nm database units, 1µm user units
    fn default() -> Self {
        Self::new(1e-3, 1e-9)
    }
}

/// # Gds Spatial Point
/// Coordinate in (x,y) layout-space, in database units.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsPoint {
    pub x: i32,
    pub y: i32,
}
impl GdsPoint {
    /// Create a new [GdsPoint]
    pub fn new(x: i32, y: i32) -> Self {
        GdsPoint { x, y }
    }
    /// Create a vector of [GdsPoint] from an array of tuples
    pub fn vec(pts: &[(i32, i32)]) -> Vec<Self> {
        pts.iter().map(|pt| Self::new(pt.0, pt.1)).collect()
    }
    /// Convert from a two-element vector
    pub(crate) fn parse(from: &[i32]) -> GdsResult<Self> {
        match from {
            [x, y] => Ok(GdsPoint::new(*x, *y)),
            _ => Err(GdsError::Str(
                "GdsPoint coordinate vector: Invalid number of elements".into(),
            )),
        }
    }
    /// Convert an n-element `i32` vector into an n/2-element vector of [GdsPoint]s
    pub(crate) fn parse_vec(from: &[i32]) -> GdsResult<Vec<GdsPoint>> {
        if from.len() % 2 != 0 {
            return Err(GdsError::Str(
                "GdsPoint coordinate vector: Invalid number of elements".into(),
            ));
        }
        Ok(from
            .chunks_exact(2)
            .map(|c| GdsPoint::new(c[0], c[1]))
            .collect())
    }
    /// Flatten to a two-element vector
    pub(crate) fn flatten(&self) -> Vec<i32> {
        vec![self.x, self.y]
    }
    /// Convert a slice of [GdsPoint]s to a 2n-element `i32` vector
    pub(crate) fn flatten_vec(src: &[GdsPoint]) -> Vec<i32> {
        src.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

/// # Gds Property
/// ```text
/// PROPATTR PROPVALUE
/// ```
#[derive(Default, Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct GdsProperty {
    /// Attribute Number
    pub attr: i16,
    /// Attribute Value
    pub value: String,
}

///
/// # Gds Path Element
///
/// ```text
/// PATH [ELFLAGS] [PLEX] LAYER DATATYPE [PATHTYPE] [WIDTH] XY [BGNEXTN] [ENDEXTN]
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsPath {
    // Required Fields
    /// Layer Number
    pub layer: i16,
    /// DataType ID
    pub datatype: i16,
    /// Centerline coordinates
    pub xy: Vec<GdsPoint>,

    // Optional Fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub width: Option<i32>,
    /// End style. 0: flush, 1: round, 2: half-width extension, 4: custom extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub path_type: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub begin_extn: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub end_extn: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

///
/// # Gds Boundary Element
///
/// A closed polygon, the bulk of most IC layout.
/// The stream format repeats the first point at the end of `xy`,
/// so an N-sided polygon carries N+1 points.
///
/// ```text
/// BOUNDARY [ELFLAGS] [PLEX] LAYER DATATYPE XY
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsBoundary {
    // Required Fields
    /// Layer Number
    pub layer: i16,
    /// DataType ID
    pub datatype: i16,
    /// Vertices, closed
    pub xy: Vec<GdsPoint>,

    // Optional Fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

///
/// # Gds Struct Reference (Cell Instance)
///
/// A single placement of another struct, located by its one-point `xy`.
/// Reflection, rotation and magnification come from `strans`.
///
/// ```text
/// SREF [ELFLAGS] [PLEX] SNAME [<strans>] XY
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsStructRef {
    // Required Fields
    /// Struct (Cell) Name
    pub name: String,
    /// Location
    pub xy: GdsPoint,

    // Optional Fields
    /// Translation & Reflection Options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub strans: Option<GdsStrans>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

///
/// # Gds Array Reference
///
/// A `cols` by `rows` array of struct instances.
/// `xy` holds the origin, the origin displaced by `cols` column-pitches,
/// and the origin displaced by `rows` row-pitches.
///
/// ```text
/// AREF [ELFLAGS] [PLEX] SNAME [<strans>] COLROW XY
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsArrayRef {
    // Required Fields
    /// Struct (Cell) Name
    pub name: String,
    /// Origin, column-extent, and row-extent points
    pub xy: [GdsPoint; 3],
    /// Number of columns
    pub cols: i16,
    /// Number of rows
    pub rows: i16,

    // Optional Fields
    /// Translation & Reflection Options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub strans: Option<GdsStrans>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

///
/// # Gds Text Element
///
/// ```text
/// TEXT [ELFLAGS] [PLEX] LAYER
/// TEXTTYPE [PRESENTATION] [PATHTYPE] [WIDTH] [<strans>] XY STRING
/// ```
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsTextElem {
    // Required Fields
    /// Text Value
    pub string: String,
    /// Layer Number
    pub layer: i16,
    /// Text-Type ID
    pub texttype: i16,
    /// Location
    pub xy: GdsPoint,

    // Optional Fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub presentation: Option<GdsPresentation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub path_type: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub width: Option<i32>,
    /// Translation & Reflection Options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub strans: Option<GdsStrans>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

///
/// # Gds Node Element
///
/// ```text
/// NODE [ELFLAGS] [PLEX] LAYER NODETYPE XY
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsNode {
    // Required Fields
    /// Layer Number
    pub layer: i16,
    /// Node-Type ID
    pub nodetype: i16,
    /// Vector of x,y coordinates
    pub xy: Vec<GdsPoint>,

    // Optional Fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

///
/// # Gds Box Element
///
/// ```text
/// BOX [ELFLAGS] [PLEX] LAYER BOXTYPE XY
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsBox {
    // Required Fields
    /// Layer Number
    pub layer: i16,
    /// Box-Type ID
    pub boxtype: i16,
    /// Five corner points, closed
    pub xy: [GdsPoint; 5],

    // Optional Fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub elflags: Option<GdsElemFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option))]
    pub plex: Option<GdsPlex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub properties: Vec<GdsProperty>,
    #[serde(skip)]
    #[builder(default, setter(skip))]
    pub source: GdsSource,
}

/// # Gds Opaque Block
/// One or more uninterpreted records, kept as raw bytes (headers included).
#[derive(Default, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsOpaque {
    pub bytes: Vec<u8>,
}

///
/// # Gds Element Enumeration
///
/// Everything which can appear inside a GDSII struct (cell).
///
/// ```text
/// {<boundary> | <path> | <SREF> | <AREF> | <text> | <node> | <box>} {<property>}* ENDEL
/// ```
///
/// Uninterpreted records found between elements appear as [GdsOpaque] blocks,
/// in their original position.
///
#[derive(derive_more::From, Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum GdsElement {
    GdsBoundary(GdsBoundary),
    GdsPath(GdsPath),
    GdsStructRef(GdsStructRef),
    GdsArrayRef(GdsArrayRef),
    GdsTextElem(GdsTextElem),
    GdsNode(GdsNode),
    GdsBox(GdsBox),
    GdsOpaque(GdsOpaque),
}
impl GdsElement {
    /// Decode a single element from its encoded records, `BOUNDARY` (etc.) through `ENDEL`
    pub fn decode(bytes: &[u8]) -> GdsResult<GdsElement> {
        GdsParser::new(bytes)?.parse_single_element()
    }
    /// Retained source bytes, if any
    pub fn source(&self) -> Option<&[u8]> {
        use GdsElement::*;
        match self {
            GdsBoundary(e) => e.source.bytes(),
            GdsPath(e) => e.source.bytes(),
            GdsStructRef(e) => e.source.bytes(),
            GdsArrayRef(e) => e.source.bytes(),
            GdsTextElem(e) => e.source.bytes(),
            GdsNode(e) => e.source.bytes(),
            GdsBox(e) => e.source.bytes(),
            GdsOpaque(_) => None,
        }
    }
    /// Set the retained source bytes. No-op for [GdsOpaque] blocks, which are all source.
    pub fn set_source(&mut self, src: GdsSource) {
        use GdsElement::*;
        match self {
            GdsBoundary(e) => e.source = src,
            GdsPath(e) => e.source = src,
            GdsStructRef(e) => e.source = src,
            GdsArrayRef(e) => e.source = src,
            GdsTextElem(e) => e.source = src,
            GdsNode(e) => e.source = src,
            GdsBox(e) => e.source = src,
            GdsOpaque(_) => (),
        }
    }
}

/// # Gds Summary Stats
///
/// Element counts by type, for a [GdsLibrary] or [GdsStruct].
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Add, AddAssign, Sub, SubAssign)]
pub struct GdsStats {
    pub libraries: usize,
    pub structs: usize,
    pub boundaries: usize,
    pub paths: usize,
    pub struct_refs: usize,
    pub array_refs: usize,
    pub text_elems: usize,
    pub nodes: usize,
    pub boxes: usize,
    pub opaque: usize,
}

/// # Gds Date & Time
///
/// Six two-byte integers: year, month, day, hour, minute, second.
/// Years are conventionally referenced to 1900, although many writers store the full year.
///
/// Values read from file are stored as-is, without validation,
/// and written back unchanged.
/// New dates default to the current time.
///
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsDateTime {
    pub year: i16,
    pub month: i16,
    pub day: i16,
    pub hour: i16,
    pub minute: i16,
    pub second: i16,
}
impl From<NaiveDateTime> for GdsDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        Self {
            year: dt.year() as i16 - 1900,
            month: dt.month() as i16,
            day: dt.day() as i16,
            hour: dt.hour() as i16,
            minute: dt.minute() as i16,
            second: dt.second() as i16,
        }
    }
}
impl TryFrom<GdsDateTime> for NaiveDateTime {
    type Error = GdsError;

    /// Fails for nonsense dates and times, e.g. "month 30" or "hour 99"
    fn try_from(dt: GdsDateTime) -> GdsResult<NaiveDateTime> {
        let ymd = NaiveDate::from_ymd_opt(dt.year as i32 + 1900, dt.month as u32, dt.day as u32)
            .ok_or_else(|| GdsError::Str("Invalid Date".to_string()))?;
        ymd.and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)
            .ok_or_else(|| GdsError::Str("Invalid Time".to_string()))
    }
}
impl GdsDateTime {
    /// The current time, rounded to GDSII's one-second resolution
    pub fn now() -> Self {
        Utc::now().naive_utc().round_subsecs(0).into()
    }
    /// Encode in stream order
    pub fn encode(&self) -> [i16; 6] {
        [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
    }
}
impl Default for GdsDateTime {
    fn default() -> Self {
        Self::now()
    }
}
impl From<&[i16; 6]> for GdsDateTime {
    /// Convert from six two-byte integers, in stream order
    fn from(d: &[i16; 6]) -> Self {
        Self {
            year: d[0],
            month: d[1],
            day: d[2],
            hour: d[3],
            minute: d[4],
            second: d[5],
        }
    }
}

/// # Gds Modification & Access Dates & Times
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsDateTimes {
    /// Last Modification Date & Time
    pub modified: GdsDateTime,
    /// Last Access Date & Time
    pub accessed: GdsDateTime,
}
impl GdsDateTimes {
    /// Encode as the twelve integers of a `BGNLIB` or `BGNSTR` record
    pub fn encode(&self) -> Vec<i16> {
        let mut rv = self.modified.encode().to_vec();
        rv.extend_from_slice(&self.accessed.encode());
        rv
    }
}
impl Default for GdsDateTimes {
    /// Both set to a single reading of the current time
    fn default() -> Self {
        let now = GdsDateTime::now();
        Self {
            modified: now.clone(),
            accessed: now,
        }
    }
}

///
/// # Gds Struct (Cell) Definition
///
/// GDSII's hierarchical unit, called a "cell" by most other layout systems.
/// Holds an ordered vector of [GdsElement]s.
///
/// ```text
/// BGNSTR STRNAME [STRCLASS] {<element>}* ENDSTR
/// ```
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsStruct {
    /// Struct Name
    pub name: String,
    /// Modification & Access Dates & Times
    pub dates: GdsDateTimes,
    /// Elements List
    pub elems: Vec<GdsElement>,
}
impl GdsStruct {
    /// Create a new and empty [GdsStruct]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Count and return our element statistics
    fn stats(&self) -> GdsStats {
        let mut stats = GdsStats::default();
        stats.structs += 1;
        for elem in &self.elems {
            use GdsElement::*;
            match elem {
                GdsBoundary(_) => stats.boundaries += 1,
                GdsPath(_) => stats.paths += 1,
                GdsStructRef(_) => stats.struct_refs += 1,
                GdsArrayRef(_) => stats.array_refs += 1,
                GdsTextElem(_) => stats.text_elems += 1,
                GdsNode(_) => stats.nodes += 1,
                GdsBox(_) => stats.boxes += 1,
                GdsOpaque(_) => stats.opaque += 1,
            };
        }
        stats
    }
}

/// # Library-Level Passthrough Position
/// Where a [GdsPassthrough] block sits, relative to the records a [GdsLibrary] interprets.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum GdsAnchor {
    /// After `BGNLIB`, before `LIBNAME`
    BeforeName,
    /// After `LIBNAME`, before `UNITS`
    BeforeUnits,
    /// Before the struct at this index, or before `ENDLIB` if past the last struct
    BeforeStruct(usize),
}

/// # Library-Level Passthrough Block
///
/// Library records which are not interpreted, e.g. `REFLIBS`, `FONTS`, `FORMAT`,
/// and record types unknown to this library.
/// Re-emitted verbatim at their anchor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GdsPassthrough {
    pub anchor: GdsAnchor,
    pub bytes: Vec<u8>,
}

///
/// # Gds Library
///
/// GDSII's top-level object, typically one per `.gds` file.
/// Holds the struct definitions, and the library-level name, version, dates, and units.
///
/// ```text
/// HEADER BGNLIB [LIBDIRSIZE] [SRFNAME] [LIBSECUR] LIBNAME [REFLIBS] [FONTS] [ATTRTABLE] [GENERATIONS] [<FormatType>]
/// UNITS {<structure>}* ENDLIB
/// ```
///
/// Records this library does not interpret land in `passthrough`,
/// and any bytes following `ENDLIB` (commonly tape-block padding) in `trailer`.
///
#[derive(Default, Clone, Builder, Debug, Deserialize, Serialize, PartialEq)]
#[builder(pattern = "owned", setter(into), build_fn(error = "GdsError"))]
pub struct GdsLibrary {
    // Required fields
    /// Library Name
    pub name: String,
    /// Gds Stream Version
    pub version: i16,
    /// Modification & Access Dates & Times
    pub dates: GdsDateTimes,
    /// Spatial Units
    pub units: GdsUnits,
    /// Struct Definitions
    pub structs: Vec<GdsStruct>,

    // Passthrough Content
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub passthrough: Vec<GdsPassthrough>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    pub trailer: Vec<u8>,
}
impl GdsLibrary {
    /// Create a new and empty [GdsLibrary]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 600,
            ..Default::default()
        }
    }
    /// Read a GDS loaded from file at path `fname`
    pub fn open(fname: impl AsRef<Path>) -> GdsResult<GdsLibrary> {
        let file = std::fs::File::open(fname)?;
        // Our one line of `unsafe`: memory-mapping the input
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_bytes(&mmap)
    }
    /// Read a [GdsLibrary] from `bytes`
    pub fn from_bytes(bytes: &[u8]) -> GdsResult<GdsLibrary> {
        let mut parser = match GdsParser::new(bytes) {
            Ok(p) => p,
            Err(_) => return Err(GdsError::BadHeader { bytepos: 0 }),
        };
        parser.parse_lib()
    }
    /// Encode to a byte-vector
    pub fn to_bytes(&self) -> GdsResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }
    /// Collect and return the library's aggregate statistics
    pub fn stats(&self) -> GdsStats {
        let mut stats = GdsStats::default();
        stats.libraries += 1;
        for strukt in self.structs.iter() {
            stats += strukt.stats();
        }
        stats
    }
    /// Save to file `fname`
    pub fn save(&self, fname: impl AsRef<Path>) -> GdsResult<()> {
        let mut wr = GdsWriter::open(fname)?;
        wr.write_lib(self)
    }
    /// Write to `file`
    pub fn write(&self, file: impl Write) -> GdsResult<()> {
        let mut wr = GdsWriter::new(file);
        wr.write_lib(self)
    }
}
// Enable [GdsLibrary] and [GdsStruct] serialization to file, in each of `fill21utils` supported formats.
impl SerdeFile for GdsLibrary {}
impl SerdeFile for GdsStruct {}

/// # Gds Context
/// Each context in which a record can be parsed, for error reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GdsContext {
    Library,
    Struct,
    StructRef,
    ArrayRef,
    Boundary,
    Box,
    Path,
    Text,
    Node,
    Property,
}

/// # GdsResult Type-Alias
pub type GdsResult<T> = Result<T, GdsError>;

/// # Gds Error Enumeration
///
/// Nearly all are decoding failures, and carry the byte offset at which they were detected.
/// A valid in-memory [GdsLibrary] can generally always be written.
#[derive(Debug)]
pub enum GdsError {
    /// Missing or malformed `HEADER` / `BGNLIB` records
    BadHeader { bytepos: u64 },
    /// `HEADER` version outside [ACCEPTED_VERSIONS]
    UnsupportedVersion { version: i16 },
    /// Stream ends mid-record, or before `ENDLIB`
    Truncated { bytepos: u64 },
    /// Invalid record length: odd, shorter than its header, or too long to encode
    RecordLen { len: usize, bytepos: u64 },
    /// Record type and data type or length do not agree
    RecordDecode {
        rtype: GdsRecordType,
        dtype: u8,
        len: u16,
        bytepos: u64,
    },
    /// `BGNSTR` without a matching `ENDSTR`
    Unterminated { strukt: String, bytepos: u64 },
    /// Geometry preceding the library's `UNITS`
    MissingUnits {
        strukt: Option<String>,
        bytepos: u64,
    },
    /// Records out of place
    Parse {
        msg: String,
        record: Option<GdsRecord>,
        recordnum: usize,
        bytepos: u64,
        ctx: Vec<GdsContext>,
    },
    /// Boxed (External) Errors
    Boxed(Box<dyn Error + Send + Sync>),
    /// Other errors
    Str(String),
}
impl GdsError {
    /// Byte offset of the failure, where known
    pub fn bytepos(&self) -> Option<u64> {
        use GdsError::*;
        match self {
            BadHeader { bytepos }
            | Truncated { bytepos }
            | RecordLen { bytepos, .. }
            | RecordDecode { bytepos, .. }
            | Unterminated { bytepos, .. }
            | MissingUnits { bytepos, .. }
            | Parse { bytepos, .. } => Some(*bytepos),
            _ => None,
        }
    }
}
impl std::fmt::Display for GdsError {
    /// Display a [GdsError].
    /// Delegates to the derived [std::fmt::Debug] implementation.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl std::error::Error for GdsError {}
impl From<std::io::Error> for GdsError {
    fn from(e: std::io::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<std::str::Utf8Error> for GdsError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<derive_builder::UninitializedFieldError> for GdsError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        Self::Str(format!("Missing required field `{}`", e.field_name()))
    }
}
impl From<String> for GdsError {
    fn from(e: String) -> Self {
        GdsError::Str(e)
    }
}
impl From<&str> for GdsError {
    fn from(e: &str) -> Self {
        GdsError::Str(e.to_string())
    }
}
impl From<fill21utils::ser::Error> for GdsError {
    fn from(e: fill21utils::ser::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}

/// Skip serializing default-`false` booleans
fn is_false(b: &bool) -> bool {
    !b
}

#[cfg(any(test, feature = "selftest"))]
/// Check `lib` matches across a write-read round-trip cycle
pub fn roundtrip(lib: &GdsLibrary) -> GdsResult<()> {
    use std::io::{Read, Seek, SeekFrom};
    use tempfile::tempfile;

    // Write to a temporary file
    let mut file = tempfile()?;
    lib.write(&mut file)?;

    // Rewind to the file-start, and read it back
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let lib2 = GdsLibrary::from_bytes(&bytes)?;

    // And check the two line up
    assert_eq!(*lib, lib2);
    Ok(())
}
