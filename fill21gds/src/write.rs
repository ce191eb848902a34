//!
//! # Fill21 GDSII Encoding and Writing
//!

// Std-Lib Imports
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

// Crates.io
use byteorder::{BigEndian, WriteBytesExt};

// Local Imports
use crate::data::*;

/// # Records Trait
/// Conversion to the sequence of [GdsRecord]s which encode an element,
/// in the order given by the GDSII grammar.
pub trait ToRecords {
    fn to_records(&self) -> Vec<GdsRecord>;
}

/// Gds Writing Helper
pub struct GdsWriter<'wr> {
    /// Write Destination
    dest: Box<dyn Write + 'wr>,
}
impl<'wr> GdsWriter<'wr> {
    /// Create new [GdsWriter] with destination file `fname`
    pub fn open(fname: impl AsRef<Path>) -> GdsResult<Self> {
        let file = BufWriter::new(File::create(fname)?);
        Ok(Self::new(file))
    }
    /// Create a new [GdsWriter] to destination `dest`
    pub fn new(dest: impl Write + 'wr) -> Self {
        Self {
            dest: Box::new(dest),
        }
    }
    /// Write a [GdsLibrary] to the destination.
    /// Passthrough blocks are emitted at their anchors, and the trailer after `ENDLIB`.
    pub fn write_lib(&mut self, lib: &GdsLibrary) -> GdsResult<()> {
        self.write_record(&GdsRecord::Header {
            version: lib.version,
        })?;
        self.write_record(&GdsRecord::BgnLib {
            dates: lib.dates.encode(),
        })?;
        self.write_passthrough(lib, |a| a == GdsAnchor::BeforeName)?;
        self.write_record(&GdsRecord::LibName(lib.name.clone()))?;
        self.write_passthrough(lib, |a| a == GdsAnchor::BeforeUnits)?;
        let (user, meters) = lib.units.to_bits();
        self.write_record(&GdsRecord::Units(user, meters))?;
        for (idx, strukt) in lib.structs.iter().enumerate() {
            self.write_passthrough(lib, |a| a == GdsAnchor::BeforeStruct(idx))?;
            self.write_struct(strukt)?;
        }
        // Blocks anchored past the final struct precede `ENDLIB`
        let nstructs = lib.structs.len();
        self.write_passthrough(lib, |a| match a {
            GdsAnchor::BeforeStruct(idx) => idx >= nstructs,
            _ => false,
        })?;
        self.write_record(&GdsRecord::EndLib)?;
        self.dest.write_all(&lib.trailer)?;
        self.dest.flush()?;
        Ok(())
    }
    /// Write each of `lib`'s passthrough blocks whose anchor matches `filter`, in order
    fn write_passthrough(
        &mut self,
        lib: &GdsLibrary,
        filter: impl Fn(GdsAnchor) -> bool,
    ) -> GdsResult<()> {
        for block in lib.passthrough.iter().filter(|b| filter(b.anchor)) {
            self.dest.write_all(&block.bytes)?;
        }
        Ok(())
    }
    /// Write [GdsStruct] `strukt` to the destination
    pub fn write_struct(&mut self, strukt: &GdsStruct) -> GdsResult<()> {
        self.write_record(&GdsRecord::BgnStruct {
            dates: strukt.dates.encode(),
        })?;
        self.write_record(&GdsRecord::StructName(strukt.name.clone()))?;
        for elem in strukt.elems.iter() {
            self.write_element(elem)?;
        }
        self.write_record(&GdsRecord::EndStruct)?;
        Ok(())
    }
    /// Write a [GdsElement].
    /// Retained source bytes are written verbatim if they still decode to `elem`.
    pub fn write_element(&mut self, elem: &GdsElement) -> GdsResult<()> {
        if let GdsElement::GdsOpaque(o) = elem {
            self.dest.write_all(&o.bytes)?;
            return Ok(());
        }
        if let Some(src) = elem.source() {
            if let Ok(decoded) = GdsElement::decode(src) {
                if decoded == *elem {
                    self.dest.write_all(src)?;
                    return Ok(());
                }
            }
        }
        for record in elem.to_records().iter() {
            self.write_record(record)?;
        }
        Ok(())
    }
    /// Encode into bytes and write onto `dest`
    pub fn write_record(&mut self, record: &GdsRecord) -> GdsResult<()> {
        // Header first: record-type, data-type, and content length.
        // Strings are padded to even lengths.
        let gds_strlen = |s: &str| -> usize { s.len() + s.len() % 2 };
        use GdsDataType::{BitArray, NoData, Str, F64, I16, I32};
        let (rtype, dtype, len): (u8, u8, usize) = match record {
            GdsRecord::Unknown { rtype, dtype, data } => (*rtype, *dtype, data.len()),
            _ => {
                let (rtype, dtype, len) = match record {
                    // Library-Level Records
                    GdsRecord::Header { .. } => (GdsRecordType::Header, I16, 2),
                    GdsRecord::BgnLib { dates } => (GdsRecordType::BgnLib, I16, 2 * dates.len()),
                    GdsRecord::LibName(s) => (GdsRecordType::LibName, Str, gds_strlen(s)),
                    GdsRecord::Units(_, _) => (GdsRecordType::Units, F64, 16),
                    GdsRecord::EndLib => (GdsRecordType::EndLib, NoData, 0),

                    // Structure (Cell) Level Records
                    GdsRecord::BgnStruct { dates } => {
                        (GdsRecordType::BgnStruct, I16, 2 * dates.len())
                    }
                    GdsRecord::StructName(s) => (GdsRecordType::StructName, Str, gds_strlen(s)),
                    GdsRecord::StructRefName(s) => {
                        (GdsRecordType::StructRefName, Str, gds_strlen(s))
                    }
                    GdsRecord::EndStruct => (GdsRecordType::EndStruct, NoData, 0),

                    // Element-Level Records
                    GdsRecord::Boundary => (GdsRecordType::Boundary, NoData, 0),
                    GdsRecord::Path => (GdsRecordType::Path, NoData, 0),
                    GdsRecord::StructRef => (GdsRecordType::StructRef, NoData, 0),
                    GdsRecord::ArrayRef => (GdsRecordType::ArrayRef, NoData, 0),
                    GdsRecord::Text => (GdsRecordType::Text, NoData, 0),
                    GdsRecord::Layer(_) => (GdsRecordType::Layer, I16, 2),
                    GdsRecord::DataType(_) => (GdsRecordType::DataType, I16, 2),
                    GdsRecord::Width(_) => (GdsRecordType::Width, I32, 4),
                    GdsRecord::Xy(d) => (GdsRecordType::Xy, I32, 4 * d.len()),
                    GdsRecord::EndElement => (GdsRecordType::EndElement, NoData, 0),

                    // Attributes and rarer records
                    GdsRecord::ColRow { .. } => (GdsRecordType::ColRow, I16, 4),
                    GdsRecord::Node => (GdsRecordType::Node, NoData, 0),
                    GdsRecord::TextType(_) => (GdsRecordType::TextType, I16, 2),
                    GdsRecord::Presentation(_, _) => (GdsRecordType::Presentation, BitArray, 2),
                    GdsRecord::String(s) => (GdsRecordType::String, Str, gds_strlen(s)),
                    GdsRecord::Strans(_, _) => (GdsRecordType::Strans, BitArray, 2),
                    GdsRecord::Mag(_) => (GdsRecordType::Mag, F64, 8),
                    GdsRecord::Angle(_) => (GdsRecordType::Angle, F64, 8),
                    GdsRecord::RefLibs(s) => (GdsRecordType::RefLibs, Str, gds_strlen(s)),
                    GdsRecord::Fonts(s) => (GdsRecordType::Fonts, Str, gds_strlen(s)),
                    GdsRecord::PathType(_) => (GdsRecordType::PathType, I16, 2),
                    GdsRecord::Generations(_) => (GdsRecordType::Generations, I16, 2),
                    GdsRecord::AttrTable(s) => (GdsRecordType::AttrTable, Str, gds_strlen(s)),
                    GdsRecord::ElemFlags(_, _) => (GdsRecordType::ElemFlags, BitArray, 2),
                    GdsRecord::Nodetype(_) => (GdsRecordType::Nodetype, I16, 2),
                    GdsRecord::PropAttr(_) => (GdsRecordType::PropAttr, I16, 2),
                    GdsRecord::PropValue(s) => (GdsRecordType::PropValue, Str, gds_strlen(s)),
                    GdsRecord::Box => (GdsRecordType::Box, NoData, 0),
                    GdsRecord::BoxType(_) => (GdsRecordType::BoxType, I16, 2),
                    GdsRecord::Plex(_) => (GdsRecordType::Plex, I32, 4),
                    GdsRecord::BeginExtn(_) => (GdsRecordType::BeginExtn, I32, 4),
                    GdsRecord::EndExtn(_) => (GdsRecordType::EndExtn, I32, 4),
                    GdsRecord::TapeNum(_) => (GdsRecordType::TapeNum, I16, 2),
                    GdsRecord::TapeCode(d) => (GdsRecordType::TapeCode, I16, 2 * d.len()),
                    GdsRecord::Format(_) => (GdsRecordType::Format, I16, 2),
                    GdsRecord::Mask(s) => (GdsRecordType::Mask, Str, gds_strlen(s)),
                    GdsRecord::EndMasks => (GdsRecordType::EndMasks, NoData, 0),
                    GdsRecord::LibDirSize(_) => (GdsRecordType::LibDirSize, I16, 2),
                    GdsRecord::SrfName(s) => (GdsRecordType::SrfName, Str, gds_strlen(s)),
                    GdsRecord::LibSecur(_) => (GdsRecordType::LibSecur, I16, 2),
                    GdsRecord::Unknown { .. } => unreachable!(),
                };
                (rtype as u8, dtype as u8, len)
            }
        };
        // Total length includes the four header bytes
        match u16::try_from(len + 4) {
            Ok(val) => self.dest.write_u16::<BigEndian>(val)?,
            Err(_) => {
                return Err(GdsError::RecordLen {
                    len: len + 4,
                    bytepos: 0,
                })
            }
        };
        self.dest.write_u8(rtype)?;
        self.dest.write_u8(dtype)?;

        // Now the content, organized by data-type
        match record {
            // NoData
            GdsRecord::EndLib
            | GdsRecord::EndStruct
            | GdsRecord::Boundary
            | GdsRecord::Path
            | GdsRecord::StructRef
            | GdsRecord::ArrayRef
            | GdsRecord::Text
            | GdsRecord::EndElement
            | GdsRecord::Node
            | GdsRecord::Box
            | GdsRecord::EndMasks => (),

            // BitArrays
            GdsRecord::Presentation(d0, d1)
            | GdsRecord::Strans(d0, d1)
            | GdsRecord::ElemFlags(d0, d1) => {
                self.dest.write_u8(*d0)?;
                self.dest.write_u8(*d1)?;
            }
            // Single I16s
            GdsRecord::Header { version: d }
            | GdsRecord::Layer(d)
            | GdsRecord::DataType(d)
            | GdsRecord::TextType(d)
            | GdsRecord::PathType(d)
            | GdsRecord::Generations(d)
            | GdsRecord::Nodetype(d)
            | GdsRecord::PropAttr(d)
            | GdsRecord::BoxType(d)
            | GdsRecord::TapeNum(d)
            | GdsRecord::Format(d)
            | GdsRecord::LibDirSize(d)
            | GdsRecord::LibSecur(d) => self.dest.write_i16::<BigEndian>(*d)?,

            // Single I32s
            GdsRecord::Width(d)
            | GdsRecord::Plex(d)
            | GdsRecord::BeginExtn(d)
            | GdsRecord::EndExtn(d) => self.dest.write_i32::<BigEndian>(*d)?,
            // Single F64s
            GdsRecord::Mag(d) | GdsRecord::Angle(d) => {
                self.dest.write_u64::<BigEndian>(GdsFloat64::encode(*d))?
            }
            // Units, already encoded
            GdsRecord::Units(d0, d1) => {
                self.dest.write_u64::<BigEndian>(*d0)?;
                self.dest.write_u64::<BigEndian>(*d1)?;
            }
            GdsRecord::ColRow { cols, rows } => {
                self.dest.write_i16::<BigEndian>(*cols)?;
                self.dest.write_i16::<BigEndian>(*rows)?;
            }
            // Vectors
            GdsRecord::TapeCode(d)
            | GdsRecord::BgnLib { dates: d }
            | GdsRecord::BgnStruct { dates: d } => {
                for val in d.iter() {
                    self.dest.write_i16::<BigEndian>(*val)?;
                }
            }
            GdsRecord::Xy(d) => {
                for val in d.iter() {
                    self.dest.write_i32::<BigEndian>(*val)?;
                }
            }
            // Strings
            GdsRecord::LibName(s)
            | GdsRecord::StructName(s)
            | GdsRecord::StructRefName(s)
            | GdsRecord::String(s)
            | GdsRecord::RefLibs(s)
            | GdsRecord::Fonts(s)
            | GdsRecord::AttrTable(s)
            | GdsRecord::PropValue(s)
            | GdsRecord::Mask(s)
            | GdsRecord::SrfName(s) => {
                self.dest.write_all(s.as_bytes())?;
                if s.len() % 2 != 0 {
                    self.dest.write_u8(0x00)?;
                }
            }
            // Raw
            GdsRecord::Unknown { data, .. } => self.dest.write_all(data)?,
        };
        Ok(())
    }
}

/// Push `PROPATTR`, `PROPVALUE` pairs for each of `props`
fn push_properties(records: &mut Vec<GdsRecord>, props: &[GdsProperty]) {
    for prop in props.iter() {
        records.push(GdsRecord::PropAttr(prop.attr));
        records.push(GdsRecord::PropValue(prop.value.clone()));
    }
}
/// Push the optional `ELFLAGS` and `PLEX` records common to all elements
fn push_flags(records: &mut Vec<GdsRecord>, elflags: &Option<GdsElemFlags>, plex: &Option<GdsPlex>) {
    if let Some(ref e) = elflags {
        records.push(GdsRecord::ElemFlags(e.0, e.1));
    }
    if let Some(ref e) = plex {
        records.push(GdsRecord::Plex(e.0));
    }
}

impl ToRecords for GdsStrans {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::Strans(
            (self.reflected as u8) << 7,
            (self.abs_mag as u8) << 2 | (self.abs_angle as u8) << 1,
        )];
        if let Some(ref e) = self.mag {
            records.push(GdsRecord::Mag(*e));
        }
        if let Some(ref e) = self.angle {
            records.push(GdsRecord::Angle(*e));
        }
        records
    }
}

impl ToRecords for GdsPath {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::Path];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::Layer(self.layer));
        records.push(GdsRecord::DataType(self.datatype));
        if let Some(ref e) = self.path_type {
            records.push(GdsRecord::PathType(*e));
        }
        if let Some(ref e) = self.width {
            records.push(GdsRecord::Width(*e));
        }
        records.push(GdsRecord::Xy(GdsPoint::flatten_vec(&self.xy)));
        if let Some(ref e) = self.begin_extn {
            records.push(GdsRecord::BeginExtn(*e));
        }
        if let Some(ref e) = self.end_extn {
            records.push(GdsRecord::EndExtn(*e));
        }
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsBoundary {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::Boundary];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::Layer(self.layer));
        records.push(GdsRecord::DataType(self.datatype));
        records.push(GdsRecord::Xy(GdsPoint::flatten_vec(&self.xy)));
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsStructRef {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::StructRef];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::StructRefName(self.name.clone()));
        if let Some(ref e) = self.strans {
            records.extend(e.to_records());
        }
        records.push(GdsRecord::Xy(self.xy.flatten()));
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsArrayRef {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::ArrayRef];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::StructRefName(self.name.clone()));
        if let Some(ref e) = self.strans {
            records.extend(e.to_records());
        }
        records.push(GdsRecord::ColRow {
            cols: self.cols,
            rows: self.rows,
        });
        records.push(GdsRecord::Xy(GdsPoint::flatten_vec(&self.xy)));
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsTextElem {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::Text];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::Layer(self.layer));
        records.push(GdsRecord::TextType(self.texttype));
        if let Some(ref e) = self.presentation {
            records.push(GdsRecord::Presentation(e.0, e.1));
        }
        if let Some(ref e) = self.path_type {
            records.push(GdsRecord::PathType(*e));
        }
        if let Some(ref e) = self.width {
            records.push(GdsRecord::Width(*e));
        }
        if let Some(ref e) = self.strans {
            records.extend(e.to_records());
        }
        records.push(GdsRecord::Xy(self.xy.flatten()));
        records.push(GdsRecord::String(self.string.clone()));
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsNode {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::Node];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::Layer(self.layer));
        records.push(GdsRecord::Nodetype(self.nodetype));
        records.push(GdsRecord::Xy(GdsPoint::flatten_vec(&self.xy)));
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsBox {
    fn to_records(&self) -> Vec<GdsRecord> {
        let mut records = vec![GdsRecord::Box];
        push_flags(&mut records, &self.elflags, &self.plex);
        records.push(GdsRecord::Layer(self.layer));
        records.push(GdsRecord::BoxType(self.boxtype));
        records.push(GdsRecord::Xy(GdsPoint::flatten_vec(&self.xy)));
        push_properties(&mut records, &self.properties);
        records.push(GdsRecord::EndElement);
        records
    }
}

impl ToRecords for GdsElement {
    /// Dispatch to each variant. [GdsOpaque] blocks have no records of their own.
    fn to_records(&self) -> Vec<GdsRecord> {
        use GdsElement::*;
        match self {
            GdsBoundary(e) => e.to_records(),
            GdsPath(e) => e.to_records(),
            GdsStructRef(e) => e.to_records(),
            GdsArrayRef(e) => e.to_records(),
            GdsTextElem(e) => e.to_records(),
            GdsNode(e) => e.to_records(),
            GdsBox(e) => e.to_records(),
            GdsOpaque(_) => Vec::new(),
        }
    }
}
