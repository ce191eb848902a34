// Crates.io
use chrono::NaiveDate;

// Local Imports
use crate::data::*;
use crate::read::*;
use crate::write::*;
use fill21utils::SerializationFormat::Yaml;

/// Specified creation date for test cases
fn test_dates() -> GdsDateTimes {
    let test_date: GdsDateTime = (&[70i16, 1, 1, 0, 0, 1]).into();
    GdsDateTimes {
        modified: test_date.clone(),
        accessed: test_date,
    }
}
/// Encode a sequence of records, as-is
fn encode(records: &[GdsRecord]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut wr = GdsWriter::new(&mut bytes);
        for r in records {
            wr.write_record(r).unwrap();
        }
    }
    bytes
}
/// Records preceding the first struct of a minimal library, named "lib"
fn lib_head() -> Vec<GdsRecord> {
    vec![
        GdsRecord::Header { version: 600 },
        GdsRecord::BgnLib {
            dates: test_dates().encode(),
        },
        GdsRecord::LibName("lib".into()),
        GdsRecord::Units(GdsFloat64::encode(1e-3), GdsFloat64::encode(1e-9)),
    ]
}
/// Rectangle vertices, closed
fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<GdsPoint> {
    GdsPoint::vec(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)])
}
/// Library with one of each element type
fn every_element_lib() -> GdsResult<GdsLibrary> {
    let mut lib = GdsLibrary::new("every");
    lib.dates = test_dates();
    let mut leaf = GdsStruct::new("leaf");
    leaf.dates = test_dates();
    leaf.elems.push(
        GdsBoundary {
            layer: 1,
            datatype: 0,
            xy: rect(0, 0, 10, 10),
            ..Default::default()
        }
        .into(),
    );
    leaf.elems.push(
        GdsPath {
            layer: 2,
            datatype: 0,
            xy: GdsPoint::vec(&[(0, 0), (100, 0), (100, 50)]),
            width: Some(4),
            path_type: Some(2),
            properties: vec![GdsProperty {
                attr: 3,
                value: "net".into(),
            }],
            ..Default::default()
        }
        .into(),
    );
    leaf.elems.push(
        GdsTextElem {
            string: "odd".into(),
            layer: 3,
            texttype: 0,
            xy: GdsPoint::new(5, 5),
            presentation: Some(GdsPresentation(0, 5)),
            ..Default::default()
        }
        .into(),
    );
    leaf.elems.push(
        GdsNode {
            layer: 4,
            nodetype: 1,
            xy: GdsPoint::vec(&[(1, 1), (2, 2)]),
            ..Default::default()
        }
        .into(),
    );
    leaf.elems.push(
        GdsBox {
            layer: 5,
            boxtype: 0,
            xy: [
                GdsPoint::new(0, 0),
                GdsPoint::new(4, 0),
                GdsPoint::new(4, 4),
                GdsPoint::new(0, 4),
                GdsPoint::new(0, 0),
            ],
            ..Default::default()
        }
        .into(),
    );
    let mut top = GdsStruct::new("top");
    top.dates = test_dates();
    top.elems.push(
        GdsStructRefBuilder::default()
            .name("leaf")
            .xy(GdsPoint::new(1000, 0))
            .strans(GdsStrans {
                reflected: true,
                mag: Some(2.0),
                angle: Some(90.0),
                ..Default::default()
            })
            .elflags(GdsElemFlags(0, 1))
            .plex(GdsPlex(7))
            .build()?
            .into(),
    );
    top.elems.push(
        GdsArrayRef {
            name: "leaf".into(),
            xy: [
                GdsPoint::new(0, 0),
                GdsPoint::new(300, 0),
                GdsPoint::new(0, 200),
            ],
            cols: 3,
            rows: 2,
            ..Default::default()
        }
        .into(),
    );
    lib.structs.push(leaf);
    lib.structs.push(top);
    Ok(lib)
}
/// Encoded library including records of unknown types at each level,
/// non-canonical unit encodings, and trailing padding.
fn unusual_bytes() -> Vec<u8> {
    let mut bytes = encode(&[
        GdsRecord::Header { version: 600 },
        GdsRecord::BgnLib {
            dates: test_dates().encode(),
        },
        GdsRecord::Unknown {
            rtype: 0x70,
            dtype: 2,
            data: vec![0, 7],
        },
        GdsRecord::LibName("unusual".into()),
        GdsRecord::RefLibs("other".into()),
        // 0.5, encoded with a denormalized mantissa
        GdsRecord::Units(0x4108_0000_0000_0000, GdsFloat64::encode(1e-9)),
        GdsRecord::Format(1),
        GdsRecord::BgnStruct {
            dates: test_dates().encode(),
        },
        GdsRecord::StructName("cell".into()),
        GdsRecord::Boundary,
        GdsRecord::Layer(1),
        GdsRecord::Unknown {
            rtype: 0x71,
            dtype: 1,
            data: vec![0xAB, 0xCD],
        },
        GdsRecord::DataType(0),
        GdsRecord::Xy(GdsPoint::flatten_vec(&rect(0, 0, 10, 20))),
        GdsRecord::EndElement,
        GdsRecord::Unknown {
            rtype: 0x72,
            dtype: 0,
            data: vec![],
        },
        GdsRecord::Text,
        GdsRecord::Layer(2),
        GdsRecord::TextType(0),
        GdsRecord::Xy(vec![5, 5]),
        GdsRecord::String("hi".into()),
        GdsRecord::EndElement,
        GdsRecord::EndStruct,
        GdsRecord::Unknown {
            rtype: 0x73,
            dtype: 2,
            data: vec![0, 1],
        },
        GdsRecord::EndLib,
    ]);
    bytes.extend_from_slice(&[0; 6]);
    bytes
}

#[test]
fn floats() -> GdsResult<()> {
    // Test conversions between normal-human and GDSII floating-point formats
    let f = GdsFloat64::encode(0.0);
    assert_eq!(f, 0);
    let d = GdsFloat64::decode(f);
    assert_eq!(d, 0.0);
    let f = GdsFloat64::encode(1.0);
    let d = GdsFloat64::decode(f);
    assert_eq!(d, 1.0);
    let f = GdsFloat64::encode(0.5);
    assert_eq!(f, 0x4080_0000_0000_0000);
    let d = GdsFloat64::decode(f);
    assert_eq!(d, 0.5);
    let f = GdsFloat64::encode(-0.69);
    let d = GdsFloat64::decode(f);
    assert_eq!(d, -0.69);
    // Non-canonical encodings decode to the same value
    assert_eq!(GdsFloat64::decode(0x4108_0000_0000_0000), 0.5);
    Ok(())
}
#[test]
fn stats() -> GdsResult<()> {
    let lib = every_element_lib()?;
    assert_eq!(
        lib.stats(),
        GdsStats {
            libraries: 1,
            structs: 2,
            boundaries: 1,
            paths: 1,
            struct_refs: 1,
            array_refs: 1,
            text_elems: 1,
            nodes: 1,
            boxes: 1,
            opaque: 0,
        }
    );
    Ok(())
}
#[test]
fn it_round_trips() -> GdsResult<()> {
    let lib = every_element_lib()?;
    roundtrip(&lib)?;
    Ok(())
}
#[test]
fn empty_lib_roundtrip() -> GdsResult<()> {
    let mut lib = GdsLibrary::new("empty");
    lib.dates = test_dates();
    roundtrip(&lib)?;
    Ok(())
}
#[test]
fn unmodified_bytes_are_identical() -> GdsResult<()> {
    let bytes = unusual_bytes();
    let lib = GdsLibrary::from_bytes(&bytes)?;
    assert_eq!(lib.to_bytes()?, bytes);
    Ok(())
}
#[test]
fn it_keeps_uninterpreted_content() -> GdsResult<()> {
    let lib = GdsLibrary::from_bytes(&unusual_bytes())?;
    assert_eq!(lib.name, "unusual");
    assert_eq!(lib.units.user, 0.5);
    assert_eq!(lib.trailer, vec![0; 6]);
    let anchors: Vec<GdsAnchor> = lib.passthrough.iter().map(|p| p.anchor).collect();
    assert_eq!(
        anchors,
        vec![
            GdsAnchor::BeforeName,
            GdsAnchor::BeforeUnits,
            GdsAnchor::BeforeStruct(0),
            GdsAnchor::BeforeStruct(1),
        ]
    );
    let cell = &lib.structs[0];
    assert_eq!(cell.elems.len(), 3);
    assert_eq!(
        cell.elems[1],
        GdsElement::GdsOpaque(GdsOpaque {
            bytes: vec![0, 4, 0x72, 0]
        })
    );
    assert_eq!(lib.stats().opaque, 1);
    Ok(())
}
#[test]
fn modified_elements_are_reencoded() -> GdsResult<()> {
    let bytes = unusual_bytes();
    let mut lib = GdsLibrary::from_bytes(&bytes)?;
    match &mut lib.structs[0].elems[0] {
        GdsElement::GdsBoundary(b) => b.layer = 11,
        _ => panic!("expected a boundary"),
    }
    let rewritten = lib.to_bytes()?;
    // The element's uninterpreted six-byte record is dropped with its source
    assert_eq!(rewritten.len(), bytes.len() - 6);
    let lib2 = GdsLibrary::from_bytes(&rewritten)?;
    assert_eq!(lib2, lib);
    match &lib2.structs[0].elems[0] {
        GdsElement::GdsBoundary(b) => assert_eq!(b.layer, 11),
        _ => panic!("expected a boundary"),
    }
    Ok(())
}
#[test]
fn changed_units_are_reencoded() -> GdsResult<()> {
    let mut lib = GdsLibrary::from_bytes(&unusual_bytes())?;
    assert_eq!(lib.units.to_bits().0, 0x4108_0000_0000_0000);
    lib.units.user = 1e-3;
    assert_eq!(lib.units.to_bits().0, GdsFloat64::encode(1e-3));
    Ok(())
}
#[test]
fn decodes_single_elements() -> GdsResult<()> {
    let lib = every_element_lib()?;
    for elem in lib.structs.iter().flat_map(|s| s.elems.iter()) {
        let bytes = encode(&elem.to_records());
        assert_eq!(GdsElement::decode(&bytes)?, *elem);
    }
    Ok(())
}
#[test]
/// Test too-long record length (>64K) generates an error
fn record_too_long() -> GdsResult<()> {
    let mut lib = GdsLibrary::new("mylib");
    let mut newcell = GdsStruct::new("mycell");
    newcell.elems.push(
        GdsBoundary {
            xy: GdsPoint::parse_vec(&vec![0; 20_000])?,
            ..GdsBoundary::default()
        }
        .into(),
    );
    lib.structs.push(newcell);
    match lib.to_bytes() {
        Err(GdsError::RecordLen { len, .. }) => assert_eq!(len, 80_004),
        other => panic!("expected RecordLen, got {:?}", other),
    }
    Ok(())
}
#[test]
fn rejects_bad_headers() {
    assert!(matches!(
        GdsLibrary::from_bytes(&[]),
        Err(GdsError::BadHeader { bytepos: 0 })
    ));
    assert!(matches!(
        GdsLibrary::from_bytes(b"hello world!"),
        Err(GdsError::BadHeader { bytepos: 0 })
    ));
    // Header without BGNLIB
    let bytes = encode(&[
        GdsRecord::Header { version: 600 },
        GdsRecord::LibName("lib".into()),
    ]);
    assert!(matches!(
        GdsLibrary::from_bytes(&bytes),
        Err(GdsError::BadHeader { bytepos: 6 })
    ));
}
#[test]
fn rejects_unsupported_versions() {
    let bytes = encode(&[GdsRecord::Header { version: 2 }]);
    assert!(matches!(
        GdsLibrary::from_bytes(&bytes),
        Err(GdsError::UnsupportedVersion { version: 2 })
    ));
    for version in ACCEPTED_VERSIONS {
        let mut records = lib_head();
        records[0] = GdsRecord::Header { version };
        records.push(GdsRecord::EndLib);
        let lib = GdsLibrary::from_bytes(&encode(&records)).unwrap();
        assert_eq!(lib.version, version);
    }
}
#[test]
fn rejects_truncated_input() -> GdsResult<()> {
    let bytes = every_element_lib()?.to_bytes()?;
    // Cut mid-record
    assert!(matches!(
        GdsLibrary::from_bytes(&bytes[..bytes.len() - 3]),
        Err(GdsError::Truncated { .. })
    ));
    // Cut at a record boundary, before ENDLIB
    assert!(matches!(
        GdsLibrary::from_bytes(&bytes[..bytes.len() - 4]),
        Err(GdsError::Truncated { .. })
    ));
    Ok(())
}
#[test]
fn rejects_bad_record_lengths() {
    let mut bytes = encode(&lib_head());
    let bytepos = bytes.len() as u64;
    bytes.extend_from_slice(&[0, 5, 0x05, 0x02, 0]);
    match GdsLibrary::from_bytes(&bytes) {
        Err(GdsError::RecordLen { len, bytepos: pos }) => {
            assert_eq!(len, 5);
            assert_eq!(pos, bytepos);
        }
        other => panic!("expected RecordLen, got {:?}", other),
    }
}
#[test]
fn rejects_mismatched_data_types() {
    let mut records = lib_head();
    records.extend(vec![
        GdsRecord::BgnStruct {
            dates: test_dates().encode(),
        },
        GdsRecord::StructName("cell".into()),
        GdsRecord::Boundary,
        // LAYER, as a four-byte integer
        GdsRecord::Unknown {
            rtype: GdsRecordType::Layer as u8,
            dtype: GdsDataType::I32 as u8,
            data: vec![0, 0, 0, 1],
        },
    ]);
    match GdsLibrary::from_bytes(&encode(&records)) {
        Err(GdsError::RecordDecode {
            rtype, dtype, len, ..
        }) => {
            assert_eq!(rtype, GdsRecordType::Layer);
            assert_eq!(dtype, 3);
            assert_eq!(len, 4);
        }
        other => panic!("expected RecordDecode, got {:?}", other),
    }
}
#[test]
fn rejects_unterminated_structs() {
    let mut records = lib_head();
    records.extend(vec![
        GdsRecord::BgnStruct {
            dates: test_dates().encode(),
        },
        GdsRecord::StructName("open".into()),
        GdsRecord::Boundary,
        GdsRecord::Layer(1),
        GdsRecord::DataType(0),
        GdsRecord::Xy(GdsPoint::flatten_vec(&rect(0, 0, 1, 1))),
        GdsRecord::EndElement,
        GdsRecord::EndLib,
    ]);
    match GdsLibrary::from_bytes(&encode(&records)) {
        Err(GdsError::Unterminated { strukt, bytepos }) => {
            assert_eq!(strukt, "open");
            // HEADER (6) + BGNLIB (28) + LIBNAME (8) + UNITS (20)
            assert_eq!(bytepos, 62);
        }
        other => panic!("expected Unterminated, got {:?}", other),
    }
}
#[test]
fn rejects_structs_before_units() {
    let records = vec![
        GdsRecord::Header { version: 600 },
        GdsRecord::BgnLib {
            dates: test_dates().encode(),
        },
        GdsRecord::LibName("lib".into()),
        GdsRecord::BgnStruct {
            dates: test_dates().encode(),
        },
        GdsRecord::StructName("early".into()),
        GdsRecord::EndStruct,
        GdsRecord::EndLib,
    ];
    match GdsLibrary::from_bytes(&encode(&records)) {
        Err(GdsError::MissingUnits { strukt, bytepos }) => {
            assert_eq!(strukt, Some("early".to_string()));
            assert_eq!(bytepos, 42);
        }
        other => panic!("expected MissingUnits, got {:?}", other),
    }
}
#[test]
fn converts_dates() -> GdsResult<()> {
    let dt = NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(1, 2, 3)
        .unwrap();
    let gds: GdsDateTime = dt.into();
    assert_eq!(gds.encode(), [124, 5, 6, 1, 2, 3]);
    let back: chrono::NaiveDateTime = gds.try_into()?;
    assert_eq!(back, dt);
    // Nonsense dates are retained, but do not convert
    let bad: GdsDateTime = (&[0i16, 30, 0, 17, 49, 18]).into();
    assert!(chrono::NaiveDateTime::try_from(bad).is_err());
    Ok(())
}
#[test]
fn it_dumps_records() -> GdsResult<()> {
    let dir = tempfile::tempdir()?;
    let gds = dir.path().join("every.gds");
    let json = dir.path().join("every.records.json");
    every_element_lib()?.save(&gds)?;
    dump(&gds, &json)?;
    let text = std::fs::read_to_string(&json)?;
    let records: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| GdsError::Boxed(Box::new(e)))?;
    let records = records.as_array().unwrap();
    assert_eq!(records[0][2], serde_json::json!({"Header": {"version": 600}}));
    assert_eq!(records[records.len() - 1][2], serde_json::json!("EndLib"));
    Ok(())
}
#[test]
fn it_saves_and_opens() -> GdsResult<()> {
    let dir = tempfile::tempdir()?;
    let fname = dir.path().join("every.gds");
    let lib = every_element_lib()?;
    lib.save(&fname)?;
    assert_eq!(GdsLibrary::open(&fname)?, lib);
    Ok(())
}
#[test]
fn lib_to_yaml() -> GdsResult<()> {
    let lib = every_element_lib()?;
    let yaml = Yaml.to_string(&lib)?;
    let lib2: GdsLibrary = Yaml.from_str(&yaml)?;
    assert_eq!(lib2, lib);
    Ok(())
}
