//!
//! # Fill21 GDSII Reading
//!

// Std-Lib Imports
use std::io::{Cursor, Read};

// Crates.io
use byteorder::{BigEndian, ReadBytesExt};
use num_traits::FromPrimitive;

// Local Imports
use crate::data::*;

/// # GdsReader
/// Decodes [GdsRecord]s from an in-memory byte slice, typically a memory-mapped file.
pub struct GdsReader<'b> {
    /// Cursor over the input
    file: Cursor<&'b [u8]>,
}
impl<'b> GdsReader<'b> {
    /// Create a [GdsReader] over `bytes`
    pub fn new(bytes: &'b [u8]) -> Self {
        Self {
            file: Cursor::new(bytes),
        }
    }
    /// Read the next record-header.
    /// Returns `None` at a clean end of input, i.e. at a record boundary.
    fn read_record_header(&mut self) -> GdsResult<Option<GdsRecordHeader>> {
        let bytepos = self.pos();
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < 4 {
            return Err(GdsError::Truncated { bytepos });
        }
        // The 16-bit record-size, in bytes, includes the four header bytes
        let len = self.file.read_u16::<BigEndian>()?;
        if len < 4 || len % 2 != 0 {
            return Err(GdsError::RecordLen {
                len: len.into(),
                bytepos,
            });
        }
        let rtype = self.file.read_u8()?;
        let dtype = self.file.read_u8()?;
        let len = len - 4;
        if (len as u64) > self.remaining() {
            return Err(GdsError::Truncated { bytepos });
        }
        Ok(Some(GdsRecordHeader { rtype, dtype, len }))
    }
    /// Read the next [GdsRecord], or `None` at a clean end of input
    pub fn read_record(&mut self) -> GdsResult<Option<GdsRecord>> {
        let bytepos = self.pos();
        let header = match self.read_record_header()? {
            Some(h) => h,
            None => return Ok(None),
        };
        // Record types we do not interpret are kept whole
        let rtype = match GdsRecordType::decode(header.rtype) {
            Some(rtype) => rtype,
            None => {
                return Ok(Some(GdsRecord::Unknown {
                    rtype: header.rtype,
                    dtype: header.dtype,
                    data: self.read_bytes(header.len)?,
                }))
            }
        };
        let dtype: Option<GdsDataType> = FromPrimitive::from_u8(header.dtype);
        let dtype = match dtype {
            Some(d) => d,
            None => {
                return Err(GdsError::RecordDecode {
                    rtype,
                    dtype: header.dtype,
                    len: header.len,
                    bytepos,
                })
            }
        };
        match self.read_record_content(rtype, dtype, header.len)? {
            Some(record) => Ok(Some(record)),
            None => Err(GdsError::RecordDecode {
                rtype,
                dtype: header.dtype,
                len: header.len,
                bytepos,
            }),
        }
    }
    /// Decode a record's content, given its types and length.
    /// Returns `None` if the combination is invalid.
    fn read_record_content(
        &mut self,
        rtype: GdsRecordType,
        dtype: GdsDataType,
        len: u16,
    ) -> GdsResult<Option<GdsRecord>> {
        use GdsDataType::{BitArray, NoData, Str, F64, I16, I32};
        let record: GdsRecord = match (rtype, dtype, len) {
            // Library-Level Records
            (GdsRecordType::Header, I16, 2) => GdsRecord::Header {
                version: self.read_i16(len)?[0],
            },
            (GdsRecordType::BgnLib, I16, 24) => GdsRecord::BgnLib {
                dates: self.read_i16(len)?,
            },
            (GdsRecordType::LibName, Str, _) => GdsRecord::LibName(self.read_str(len)?),
            (GdsRecordType::Units, F64, 16) => {
                let v = self.read_u64(len)?;
                GdsRecord::Units(v[0], v[1])
            }
            (GdsRecordType::EndLib, NoData, 0) => GdsRecord::EndLib,

            // Structure (Cell) Level Records
            (GdsRecordType::BgnStruct, I16, 24) => GdsRecord::BgnStruct {
                dates: self.read_i16(len)?,
            },
            (GdsRecordType::StructName, Str, _) => GdsRecord::StructName(self.read_str(len)?),
            (GdsRecordType::StructRefName, Str, _) => {
                GdsRecord::StructRefName(self.read_str(len)?)
            }
            (GdsRecordType::EndStruct, NoData, 0) => GdsRecord::EndStruct,

            // Element-Level Records
            (GdsRecordType::Boundary, NoData, 0) => GdsRecord::Boundary,
            (GdsRecordType::Path, NoData, 0) => GdsRecord::Path,
            (GdsRecordType::StructRef, NoData, 0) => GdsRecord::StructRef,
            (GdsRecordType::ArrayRef, NoData, 0) => GdsRecord::ArrayRef,
            (GdsRecordType::Text, NoData, 0) => GdsRecord::Text,
            (GdsRecordType::Layer, I16, 2) => GdsRecord::Layer(self.read_i16(len)?[0]),
            (GdsRecordType::DataType, I16, 2) => GdsRecord::DataType(self.read_i16(len)?[0]),
            (GdsRecordType::Width, I32, 4) => GdsRecord::Width(self.read_i32(len)?[0]),
            (GdsRecordType::Xy, I32, _) if len % 4 == 0 => GdsRecord::Xy(self.read_i32(len)?),
            (GdsRecordType::EndElement, NoData, 0) => GdsRecord::EndElement,

            // Element attributes, and the rarer library records
            (GdsRecordType::ColRow, I16, 4) => {
                let d = self.read_i16(len)?;
                GdsRecord::ColRow {
                    cols: d[0],
                    rows: d[1],
                }
            }
            (GdsRecordType::Node, NoData, 0) => GdsRecord::Node,
            (GdsRecordType::TextType, I16, 2) => GdsRecord::TextType(self.read_i16(len)?[0]),
            (GdsRecordType::Presentation, BitArray, 2) => {
                let bytes = self.read_bytes(len)?;
                GdsRecord::Presentation(bytes[0], bytes[1])
            }
            (GdsRecordType::String, Str, _) => GdsRecord::String(self.read_str(len)?),
            (GdsRecordType::Strans, BitArray, 2) => {
                let bytes = self.read_bytes(len)?;
                GdsRecord::Strans(bytes[0], bytes[1])
            }
            (GdsRecordType::Mag, F64, 8) => GdsRecord::Mag(self.read_f64(len)?[0]),
            (GdsRecordType::Angle, F64, 8) => GdsRecord::Angle(self.read_f64(len)?[0]),
            (GdsRecordType::RefLibs, Str, _) => GdsRecord::RefLibs(self.read_str(len)?),
            (GdsRecordType::Fonts, Str, _) => GdsRecord::Fonts(self.read_str(len)?),
            (GdsRecordType::PathType, I16, 2) => GdsRecord::PathType(self.read_i16(len)?[0]),
            (GdsRecordType::Generations, I16, 2) => {
                GdsRecord::Generations(self.read_i16(len)?[0])
            }
            (GdsRecordType::AttrTable, Str, _) => GdsRecord::AttrTable(self.read_str(len)?),
            (GdsRecordType::ElemFlags, BitArray, 2) => {
                let bytes = self.read_bytes(len)?;
                GdsRecord::ElemFlags(bytes[0], bytes[1])
            }
            (GdsRecordType::Nodetype, I16, 2) => GdsRecord::Nodetype(self.read_i16(len)?[0]),
            (GdsRecordType::PropAttr, I16, 2) => GdsRecord::PropAttr(self.read_i16(len)?[0]),
            (GdsRecordType::PropValue, Str, _) => GdsRecord::PropValue(self.read_str(len)?),
            (GdsRecordType::Box, NoData, 0) => GdsRecord::Box,
            (GdsRecordType::BoxType, I16, 2) => GdsRecord::BoxType(self.read_i16(len)?[0]),
            (GdsRecordType::Plex, I32, 4) => GdsRecord::Plex(self.read_i32(len)?[0]),
            (GdsRecordType::BeginExtn, I32, 4) => GdsRecord::BeginExtn(self.read_i32(len)?[0]),
            (GdsRecordType::EndExtn, I32, 4) => GdsRecord::EndExtn(self.read_i32(len)?[0]),
            (GdsRecordType::TapeNum, I16, 2) => GdsRecord::TapeNum(self.read_i16(len)?[0]),
            (GdsRecordType::TapeCode, I16, 12) => GdsRecord::TapeCode(self.read_i16(len)?),
            (GdsRecordType::Format, I16, 2) => GdsRecord::Format(self.read_i16(len)?[0]),
            (GdsRecordType::Mask, Str, _) => GdsRecord::Mask(self.read_str(len)?),
            (GdsRecordType::EndMasks, NoData, 0) => GdsRecord::EndMasks,
            (GdsRecordType::LibDirSize, I16, 2) => {
                GdsRecord::LibDirSize(self.read_i16(len)?[0])
            }
            (GdsRecordType::SrfName, Str, _) => GdsRecord::SrfName(self.read_str(len)?),
            (GdsRecordType::LibSecur, I16, 2) => GdsRecord::LibSecur(self.read_i16(len)?[0]),

            _ => return Ok(None),
        };
        Ok(Some(record))
    }
    /// Read `len` bytes and convert to `String`.
    /// A single trailing NUL, GDSII's padding for odd-length strings, is stripped.
    fn read_str(&mut self, len: u16) -> GdsResult<String> {
        let data = self.read_bytes(len)?;
        let data = match data.split_last() {
            Some((0x00, rest)) => rest,
            _ => &data[..],
        };
        Ok(std::str::from_utf8(data)?.into())
    }
    /// Read `len` bytes
    fn read_bytes(&mut self, len: u16) -> GdsResult<Vec<u8>> {
        let mut rv: Vec<u8> = vec![0; len.into()];
        self.file.read_exact(&mut rv)?;
        Ok(rv)
    }
    /// Read `len/2` i16s from `len` bytes
    fn read_i16(&mut self, len: u16) -> GdsResult<Vec<i16>> {
        let mut rv: Vec<i16> = vec![0; usize::from(len) / 2];
        self.file.read_i16_into::<BigEndian>(&mut rv)?;
        Ok(rv)
    }
    /// Read `len/4` i32s from `len` bytes
    fn read_i32(&mut self, len: u16) -> GdsResult<Vec<i32>> {
        let mut rv: Vec<i32> = vec![0; usize::from(len) / 4];
        self.file.read_i32_into::<BigEndian>(&mut rv)?;
        Ok(rv)
    }
    /// Read `len/8` raw eight-byte reals from `len` bytes
    fn read_u64(&mut self, len: u16) -> GdsResult<Vec<u64>> {
        let mut rv: Vec<u64> = vec![0; usize::from(len) / 8];
        self.file.read_u64_into::<BigEndian>(&mut rv)?;
        Ok(rv)
    }
    /// Read `len/8` f64s from `len` bytes, decoding GDSII's float-format along the way
    fn read_f64(&mut self, len: u16) -> GdsResult<Vec<f64>> {
        Ok(self
            .read_u64(len)?
            .into_iter()
            .map(GdsFloat64::decode)
            .collect())
    }
    /// Get the current position
    pub fn pos(&self) -> u64 {
        self.file.position()
    }
    /// Number of unread bytes
    fn remaining(&self) -> u64 {
        (self.file.get_ref().len() as u64).saturating_sub(self.pos())
    }
    /// Borrow the input between offsets `start` and `end`
    fn slice(&self, start: u64, end: u64) -> &'b [u8] {
        let bytes: &'b [u8] = *self.file.get_ref();
        &bytes[start as usize..end as usize]
    }
}

/// # GdsParser
/// A peekable iterator over [GdsRecord]s, which assembles them into a [GdsLibrary] tree.
/// Tracks the byte offset of each record, so that elements can retain their source bytes.
pub struct GdsParser<'b> {
    /// Record Reader
    rdr: GdsReader<'b>,
    /// Next record, stored for peeking. `None` at end of input, or after `ENDLIB`.
    nxt: Option<GdsRecord>,
    /// Offset of `nxt`, equivalently the end of the most recently returned record
    nxt_pos: u64,
    /// Offset of the most recently returned record
    cur_pos: u64,
    /// Number of records read
    numread: usize,
    /// Context Stack
    ctx_stack: Vec<GdsContext>,
}
impl<'b> GdsParser<'b> {
    /// Create a new [GdsParser] over `bytes`, decoding its first record
    pub fn new(bytes: &'b [u8]) -> GdsResult<Self> {
        let mut rdr = GdsReader::new(bytes);
        let nxt = rdr.read_record()?;
        Ok(Self {
            rdr,
            nxt,
            nxt_pos: 0,
            cur_pos: 0,
            numread: 0,
            ctx_stack: Vec::new(),
        })
    }
    /// Advance our iterator and return the next record
    fn next(&mut self) -> GdsResult<GdsRecord> {
        let rv = match self.nxt.take() {
            Some(r) => r,
            None => {
                return Err(GdsError::Truncated {
                    bytepos: self.nxt_pos,
                })
            }
        };
        self.numread += 1;
        self.cur_pos = self.nxt_pos;
        self.nxt_pos = self.rdr.pos();
        // Anything after `ENDLIB` is trailer, not records
        if rv != GdsRecord::EndLib {
            self.nxt = self.rdr.read_record()?;
        }
        Ok(rv)
    }
    /// Peek at our next record, without advancing
    fn peek(&self) -> Option<&GdsRecord> {
        self.nxt.as_ref()
    }
    /// Bytes of the records consumed since offset `start`
    fn since(&self, start: u64) -> &'b [u8] {
        self.rdr.slice(start, self.nxt_pos)
    }
    /// Parse a [GdsLibrary]. The start-state for reading a GDS file.
    pub fn parse_lib(&mut self) -> GdsResult<GdsLibrary> {
        self.ctx_stack.push(GdsContext::Library);
        let mut lib = GdsLibraryBuilder::default();
        // Read the Header and its version data
        let version = match self.next() {
            Ok(GdsRecord::Header { version }) => version,
            _ => return Err(GdsError::BadHeader { bytepos: 0 }),
        };
        if !ACCEPTED_VERSIONS.contains(&version) {
            return Err(GdsError::UnsupportedVersion { version });
        }
        lib = lib.version(version);
        // Read the begin-lib
        lib = match self.next()? {
            GdsRecord::BgnLib { dates } => lib.dates(self.parse_datetimes(&dates)?),
            _ => {
                return Err(GdsError::BadHeader {
                    bytepos: self.cur_pos,
                })
            }
        };
        let mut name = None;
        let mut units = None;
        let mut structs = Vec::<GdsStruct>::new();
        let mut passthrough = Vec::new();
        let mut anchor = GdsAnchor::BeforeName;
        loop {
            let start = self.nxt_pos;
            let r = self.next()?;
            match r {
                GdsRecord::EndLib => break,
                GdsRecord::LibName(d) => {
                    name = Some(d);
                    anchor = GdsAnchor::BeforeUnits;
                }
                GdsRecord::Units(d0, d1) => {
                    units = Some(GdsUnits::from_bits(d0, d1));
                    anchor = GdsAnchor::BeforeStruct(structs.len());
                }
                GdsRecord::BgnStruct { dates } => {
                    if units.is_none() {
                        let strukt = match self.peek() {
                            Some(GdsRecord::StructName(s)) => Some(s.clone()),
                            _ => None,
                        };
                        return Err(GdsError::MissingUnits {
                            strukt,
                            bytepos: start,
                        });
                    }
                    structs.push(self.parse_struct(&dates)?);
                    anchor = GdsAnchor::BeforeStruct(structs.len());
                }
                // Valid but uninterpreted library records, and unknown ones, pass through
                GdsRecord::LibDirSize(_)
                | GdsRecord::SrfName(_)
                | GdsRecord::LibSecur(_)
                | GdsRecord::RefLibs(_)
                | GdsRecord::Fonts(_)
                | GdsRecord::AttrTable(_)
                | GdsRecord::Generations(_)
                | GdsRecord::Format(_)
                | GdsRecord::Mask(_)
                | GdsRecord::EndMasks
                | GdsRecord::TapeNum(_)
                | GdsRecord::TapeCode(_)
                | GdsRecord::Unknown { .. } => passthrough.push(GdsPassthrough {
                    anchor,
                    bytes: self.since(start).to_vec(),
                }),
                // Invalid
                _ => return self.invalid(r),
            };
        }
        let units = match units {
            Some(u) => u,
            None => {
                return Err(GdsError::MissingUnits {
                    strukt: None,
                    bytepos: self.cur_pos,
                })
            }
        };
        let name = match name {
            Some(n) => n,
            None => return self.fail("Missing LIBNAME"),
        };
        let trailer = self.rdr.slice(self.nxt_pos, self.nxt_pos + self.rdr.remaining());
        lib = lib
            .name(name)
            .units(units)
            .structs(structs)
            .passthrough(passthrough)
            .trailer(trailer.to_vec());
        self.ctx_stack.pop();
        lib.build()
    }
    /// Parse a cell ([GdsStruct]), following its `BGNSTR` record
    fn parse_struct(&mut self, dates: &[i16]) -> GdsResult<GdsStruct> {
        self.ctx_stack.push(GdsContext::Struct);
        let begin = self.cur_pos;
        let mut strukt = GdsStructBuilder::default();
        strukt = strukt.dates(self.parse_datetimes(dates)?);
        let name = match self.next()? {
            GdsRecord::StructName(d) => d,
            _ => return self.fail("Missing Gds StructName"),
        };
        strukt = strukt.name(name.clone());
        // Parse [GdsElement]s until hitting `ENDSTR`
        let mut elems = Vec::<GdsElement>::new();
        loop {
            let start = self.nxt_pos;
            match self.peek() {
                Some(GdsRecord::EndStruct) => {
                    self.next()?;
                    break;
                }
                None | Some(GdsRecord::EndLib) | Some(GdsRecord::BgnStruct { .. }) => {
                    return Err(GdsError::Unterminated {
                        strukt: name,
                        bytepos: begin,
                    })
                }
                Some(GdsRecord::Unknown { .. }) => {
                    self.next()?;
                    elems.push(
                        GdsOpaque {
                            bytes: self.since(start).to_vec(),
                        }
                        .into(),
                    );
                }
                Some(_) => {
                    let mut elem = self.parse_element()?;
                    elem.set_source(GdsSource::new(self.since(start)));
                    elems.push(elem);
                }
            }
        }
        strukt = strukt.elems(elems);
        self.ctx_stack.pop();
        strukt.build()
    }
    /// Parse the sole element in our input, as for [GdsElement::decode]
    pub(crate) fn parse_single_element(&mut self) -> GdsResult<GdsElement> {
        let elem = self.parse_element()?;
        if self.peek().is_some() {
            return self.fail("Records following element");
        }
        Ok(elem)
    }
    /// Parse a [GdsElement], beginning with its element-type record
    fn parse_element(&mut self) -> GdsResult<GdsElement> {
        let r = self.next()?;
        let elem = match r {
            GdsRecord::Boundary => self.parse_boundary()?.into(),
            GdsRecord::Text => self.parse_text_elem()?.into(),
            GdsRecord::Path => self.parse_path()?.into(),
            GdsRecord::Box => self.parse_box()?.into(),
            GdsRecord::StructRef => self.parse_struct_ref()?.into(),
            GdsRecord::ArrayRef => self.parse_array_ref()?.into(),
            GdsRecord::Node => self.parse_node()?.into(),
            _ => return self.invalid(r),
        };
        Ok(elem)
    }
    /// Parse a [GdsBoundary]
    fn parse_boundary(&mut self) -> GdsResult<GdsBoundary> {
        self.ctx_stack.push(GdsContext::Boundary);
        let mut b = GdsBoundaryBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::Layer(d) => b.layer(d),
                GdsRecord::DataType(d) => b.datatype(d),
                GdsRecord::Xy(d) => b.xy(GdsPoint::parse_vec(&d)?),
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                // Uninterpreted records survive in the element's source bytes
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsPath]
    fn parse_path(&mut self) -> GdsResult<GdsPath> {
        self.ctx_stack.push(GdsContext::Path);
        let mut b = GdsPathBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::Layer(d) => b.layer(d),
                GdsRecord::DataType(d) => b.datatype(d),
                GdsRecord::Xy(d) => b.xy(GdsPoint::parse_vec(&d)?),
                GdsRecord::Width(d) => b.width(d),
                GdsRecord::PathType(d) => b.path_type(d),
                GdsRecord::BeginExtn(d) => b.begin_extn(d),
                GdsRecord::EndExtn(d) => b.end_extn(d),
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsTextElem].
    /// Requires the initial `TEXT` record has already been consumed.
    fn parse_text_elem(&mut self) -> GdsResult<GdsTextElem> {
        self.ctx_stack.push(GdsContext::Text);
        let mut b = GdsTextElemBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::Layer(d) => b.layer(d),
                GdsRecord::TextType(d) => b.texttype(d),
                GdsRecord::Xy(d) => b.xy(GdsPoint::parse(&d)?),
                GdsRecord::String(d) => b.string(d),
                GdsRecord::Presentation(d0, d1) => b.presentation(GdsPresentation(d0, d1)),
                GdsRecord::PathType(d) => b.path_type(d),
                GdsRecord::Width(d) => b.width(d),
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::Strans(d0, d1) => b.strans(self.parse_strans(d0, d1)?),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsNode]
    fn parse_node(&mut self) -> GdsResult<GdsNode> {
        self.ctx_stack.push(GdsContext::Node);
        let mut b = GdsNodeBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::Layer(d) => b.layer(d),
                GdsRecord::Nodetype(d) => b.nodetype(d),
                GdsRecord::Xy(d) => b.xy(GdsPoint::parse_vec(&d)?),
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsBox]
    fn parse_box(&mut self) -> GdsResult<GdsBox> {
        self.ctx_stack.push(GdsContext::Box);
        let mut b = GdsBoxBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::Layer(d) => b.layer(d),
                GdsRecord::BoxType(d) => b.boxtype(d),
                GdsRecord::Xy(d) => {
                    // Exactly five points
                    let xy: [GdsPoint; 5] = match GdsPoint::parse_vec(&d)?.try_into() {
                        Ok(xy) => xy,
                        Err(_) => return self.fail("Invalid XY for GdsBox"),
                    };
                    b.xy(xy)
                }
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsStructRef]
    fn parse_struct_ref(&mut self) -> GdsResult<GdsStructRef> {
        self.ctx_stack.push(GdsContext::StructRef);
        let mut b = GdsStructRefBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::StructRefName(d) => b.name(d),
                GdsRecord::Xy(d) => b.xy(GdsPoint::parse(&d)?),
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::Strans(d0, d1) => b.strans(self.parse_strans(d0, d1)?),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsArrayRef]
    fn parse_array_ref(&mut self) -> GdsResult<GdsArrayRef> {
        self.ctx_stack.push(GdsContext::ArrayRef);
        let mut b = GdsArrayRefBuilder::default();
        let mut props: Vec<GdsProperty> = Vec::new();

        loop {
            let r = self.next()?;
            b = match r {
                GdsRecord::EndElement => break,
                GdsRecord::StructRefName(d) => b.name(d),
                GdsRecord::ColRow { rows, cols } => b.rows(rows).cols(cols),
                GdsRecord::Xy(d) => {
                    // Exactly three points
                    let xy: [GdsPoint; 3] = match GdsPoint::parse_vec(&d)?.try_into() {
                        Ok(xy) => xy,
                        Err(_) => return self.fail("Invalid XY for GdsArrayRef"),
                    };
                    b.xy(xy)
                }
                GdsRecord::Plex(d) => b.plex(GdsPlex(d)),
                GdsRecord::ElemFlags(d0, d1) => b.elflags(GdsElemFlags(d0, d1)),
                GdsRecord::Strans(d0, d1) => b.strans(self.parse_strans(d0, d1)?),
                GdsRecord::PropAttr(attr) => {
                    props.push(self.parse_property(attr)?);
                    b
                }
                GdsRecord::Unknown { .. } => b,
                _ => return self.invalid(r),
            };
        }
        b = b.properties(props);
        self.ctx_stack.pop();
        b.build()
    }
    /// Parse a [GdsStrans], from its two flag bytes and any following `MAG` and `ANGLE`
    fn parse_strans(&mut self, d0: u8, d1: u8) -> GdsResult<GdsStrans> {
        let mut s = GdsStrans {
            reflected: d0 & 0x80 != 0,
            abs_mag: d1 & 0x04 != 0,
            abs_angle: d1 & 0x02 != 0,
            ..Default::default()
        };
        loop {
            match self.peek() {
                Some(GdsRecord::Mag(d)) => {
                    s.mag = Some(*d);
                    self.next()?;
                }
                Some(GdsRecord::Angle(d)) => {
                    s.angle = Some(*d);
                    self.next()?;
                }
                _ => break,
            }
        }
        Ok(s)
    }
    /// Parse a [GdsProperty], whose `PROPATTR` has already been consumed
    fn parse_property(&mut self, attr: i16) -> GdsResult<GdsProperty> {
        self.ctx_stack.push(GdsContext::Property);
        // `PROPATTR` must be immediately followed by `PROPVALUE`
        let value = match self.next()? {
            GdsRecord::PropValue(v) => v,
            _ => return self.fail("Gds Property without PropValue"),
        };
        self.ctx_stack.pop();
        Ok(GdsProperty { attr, value })
    }
    /// Parse the twelve integers of a `BGNLIB` or `BGNSTR` record
    fn parse_datetimes(&mut self, d: &[i16]) -> GdsResult<GdsDateTimes> {
        match d {
            [m0, m1, m2, m3, m4, m5, a0, a1, a2, a3, a4, a5] => Ok(GdsDateTimes {
                modified: (&[*m0, *m1, *m2, *m3, *m4, *m5]).into(),
                accessed: (&[*a0, *a1, *a2, *a3, *a4, *a5]).into(),
            }),
            _ => self.fail("Invalid length GdsDateTimes"),
        }
    }
    /// Error helper for an invalid record
    fn invalid<T>(&mut self, record: GdsRecord) -> GdsResult<T> {
        Err(GdsError::Parse {
            msg: "Invalid GDS Record".into(),
            record: Some(record),
            recordnum: self.numread,
            bytepos: self.cur_pos,
            ctx: self.ctx_stack.clone(),
        })
    }
    /// Error helper. Create a Parse error
    fn err(&mut self, msg: impl Into<String>) -> GdsError {
        GdsError::Parse {
            msg: msg.into(),
            record: self.peek().cloned(),
            recordnum: self.numread,
            bytepos: self.cur_pos,
            ctx: self.ctx_stack.clone(),
        }
    }
    /// Return failure
    fn fail<T>(&mut self, msg: impl Into<String>) -> GdsResult<T> {
        Err(self.err(msg))
    }
}

/// # Record Dump
/// JSON listing of every record in a GDS file, with its record-number and byte offset.
/// A debugging aid.
#[cfg(any(test, feature = "selftest"))]
pub fn dump(gds: impl AsRef<std::path::Path>, json: impl AsRef<std::path::Path>) -> GdsResult<()> {
    use std::io::Write;

    let bytes = std::fs::read(gds)?;
    let mut rdr = GdsReader::new(&bytes);
    let mut w = std::io::BufWriter::new(std::fs::File::create(json)?);
    writeln!(w, "[")?;
    let mut recordnum = 0;
    loop {
        let bytepos = rdr.pos();
        let r = match rdr.read_record()? {
            Some(r) => r,
            None => break,
        };
        recordnum += 1;
        let done = r == GdsRecord::EndLib;
        let s = serde_json::to_string(&(recordnum, bytepos, r))
            .map_err(|e| GdsError::Boxed(Box::new(e)))?;
        let sep = if done { "" } else { "," };
        writeln!(w, "\t{}{}", s, sep)?;
        if done {
            break;
        }
    }
    writeln!(w, "]")?;
    w.flush()?;
    Ok(())
}
