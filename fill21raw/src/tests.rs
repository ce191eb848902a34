//!
//! # fill21raw unit tests
//!

use super::*;
use crate::gds21::{
    GdsArrayRef, GdsBoundary, GdsDateTime, GdsDateTimes, GdsElement, GdsLibrary, GdsPath,
    GdsPoint, GdsProperty, GdsStrans, GdsStruct, GdsStructRef, GdsTextElem,
};

/// Fixed dates, so encodings are repeatable
fn dates() -> GdsDateTimes {
    let d: GdsDateTime = (&[70i16, 1, 1, 0, 0, 1]).into();
    GdsDateTimes {
        modified: d.clone(),
        accessed: d,
    }
}
/// Closed rectangular [GdsBoundary]
fn boundary(layer: i16, x0: i32, y0: i32, x1: i32, y1: i32) -> GdsBoundary {
    GdsBoundary {
        layer,
        datatype: 0,
        xy: GdsPoint::vec(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
        ..Default::default()
    }
}
///
/// Two-cell library:
/// * `leaf` holds a 10x20 rectangle on 1/0, a vertical width-4 path on 2/0, and a label.
/// * `top` places `leaf` once rotated at (100, 0), and in a 3x2 array at the origin,
///   and holds a fill-marked rectangle on 1/0.
///
fn sample_lib() -> GdsLibrary {
    let mut lib = GdsLibrary::new("sample");
    lib.dates = dates();
    let mut leaf = GdsStruct::new("leaf");
    leaf.dates = dates();
    leaf.elems = vec![
        boundary(1, 0, 0, 10, 20).into(),
        GdsPath {
            layer: 2,
            datatype: 0,
            xy: GdsPoint::vec(&[(0, 0), (0, 20)]),
            width: Some(4),
            ..Default::default()
        }
        .into(),
        GdsTextElem {
            string: "label".into(),
            layer: 3,
            texttype: 0,
            xy: GdsPoint::new(1, 1),
            ..Default::default()
        }
        .into(),
    ];
    let mut top = GdsStruct::new("top");
    top.dates = dates();
    top.elems = vec![
        GdsStructRef {
            name: "leaf".into(),
            xy: GdsPoint::new(100, 0),
            strans: Some(GdsStrans {
                angle: Some(90.0),
                ..Default::default()
            }),
            ..Default::default()
        }
        .into(),
        GdsArrayRef {
            name: "leaf".into(),
            xy: [GdsPoint::new(0, 0), GdsPoint::new(60, 0), GdsPoint::new(0, 60)],
            cols: 3,
            rows: 2,
            ..Default::default()
        }
        .into(),
        GdsBoundary {
            properties: vec![GdsProperty {
                attr: 126,
                value: "fill21".into(),
            }],
            ..boundary(1, -50, -50, -40, -40)
        }
        .into(),
    ];
    lib.structs = vec![leaf, top];
    lib
}
fn sample_bytes() -> LayoutResult<Vec<u8>> {
    Ok(sample_lib().to_bytes()?)
}

#[test]
fn point() {
    let p = Point::new(1, 2);
    assert_eq!(p.x, 1);
    assert_eq!(p.y, 2);
}
#[test]
fn units() {
    let units = Units::new(1e-3, 1e-9);
    assert_eq!(units.db_to_meter(), 1e-9);
    assert_eq!(units.user_to_db().round(), 1000.0);
}
#[test]
fn it_imports() -> LayoutResult<()> {
    let layout = Layout::decode(&sample_bytes()?)?;
    assert_eq!(layout.name, "sample");
    assert_eq!(layout.cells.len(), 2);
    assert_eq!(layout.roots(), vec!["top"]);
    assert_eq!(layout.top_cell(), Some("top"));

    let leaf = layout.cell("leaf").ok_or("missing leaf")?;
    assert_eq!(leaf.elems.len(), 3);
    let rects: Vec<_> = leaf.shapes(Layer::new(1, 0)).collect();
    assert_eq!(rects.len(), 1);
    assert_eq!(
        rects[0].shape,
        Shape::Rect(Rect::new(Point::new(0, 0), Point::new(10, 20)))
    );
    assert_eq!(rects[0].tag, Tag::Design);
    let paths: Vec<_> = leaf.shapes(Layer::new(2, 0)).collect();
    assert_eq!(
        paths[0].shape,
        Shape::Path(Path {
            points: vec![Point::new(0, 0), Point::new(0, 20)],
            width: 4,
            ends: PathEnds::Flush,
        })
    );
    assert!(matches!(leaf.elems[2], Element::Text(_)));

    let top = layout.cell("top").ok_or("missing top")?;
    let refs: Vec<_> = top.references().collect();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].angle, 90.0);
    assert_eq!(refs[0].count(), 1);
    assert_eq!(refs[1].count(), 6);
    let fill: Vec<_> = top.all_shapes().collect();
    assert_eq!(fill.len(), 1);
    assert_eq!(fill[0].tag, Tag::Fill);
    assert!(fill[0].props.is_empty());
    assert_eq!(
        layout.layers().into_iter().collect::<Vec<_>>(),
        vec![Layer::new(1, 0), Layer::new(2, 0)]
    );
    Ok(())
}
#[test]
fn unmodified_layouts_encode_identically() -> LayoutResult<()> {
    let bytes = sample_bytes()?;
    let layout = Layout::decode(&bytes)?;
    assert_eq!(layout.encode()?, bytes);
    Ok(())
}
#[test]
fn modified_layouts_reencode() -> LayoutResult<()> {
    let bytes = sample_bytes()?;
    let mut layout = Layout::decode(&bytes)?;
    let removed = layout.remove_shapes("top", Layer::new(1, 0), |s| s.tag == Tag::Fill)?;
    assert_eq!(removed, 1);
    layout.insert_shape(
        "leaf",
        Layer::new(1, 0),
        Tag::Design,
        Rect::new(Point::new(20, 0), Point::new(25, 5)),
    )?;
    let encoded = layout.encode()?;
    assert_ne!(encoded, bytes);
    assert_eq!(Layout::decode(&encoded)?, layout);
    Ok(())
}
#[test]
fn fill_is_marked() -> LayoutResult<()> {
    let mut layout = Layout::decode(&sample_bytes()?)?;
    let fill = Rect::new(Point::new(200, 200), Point::new(210, 210));
    layout.insert_shape("top", Layer::new(1, 0), Tag::Fill, fill.clone())?;
    let lib = layout.to_gds()?;
    let last = lib.structs[1].elems.last().ok_or("no elements")?;
    match last {
        GdsElement::GdsBoundary(b) => {
            assert_eq!(b.properties.len(), 1);
            assert_eq!(b.properties[0].attr, FILL_MARKER_ATTR);
            assert_eq!(b.properties[0].value, FILL_MARKER_VALUE);
        }
        other => panic!("unexpected element {:?}", other),
    }
    let decoded = Layout::decode(&lib.to_bytes()?)?;
    let top = decoded.cell("top").ok_or("missing top")?;
    let filled: Vec<_> = top.all_shapes().filter(|s| s.tag == Tag::Fill).collect();
    assert_eq!(filled.len(), 2);
    assert_eq!(filled[1].shape, Shape::Rect(fill));
    Ok(())
}
#[test]
fn it_adopts_fill_layers() -> LayoutResult<()> {
    let bytes = sample_bytes()?;
    let opts = ImportOptions {
        fill_layers: vec![Layer::new(2, 0)],
    };
    let layout = Layout::decode_with(&bytes, opts)?;
    let leaf = layout.cell("leaf").ok_or("missing leaf")?;
    assert!(leaf.shapes(Layer::new(2, 0)).all(|s| s.tag == Tag::Fill));
    assert!(leaf.shapes(Layer::new(1, 0)).all(|s| s.tag == Tag::Design));
    // Adoption alone does not change the encoding
    assert_eq!(layout.encode()?, bytes);
    Ok(())
}
#[test]
fn layout_bbox() -> LayoutResult<()> {
    let layout = Layout::decode(&sample_bytes()?)?;
    let bboxes = layout.cell_bboxes()?;
    assert_eq!(bboxes["leaf"], BoundBox::new(-2, 0, 10, 20));
    assert_eq!(layout.bbox()?, BoundBox::new(-50, -50, 100, 50));
    Ok(())
}
#[test]
fn it_flattens() -> LayoutResult<()> {
    let layout = Layout::decode(&sample_bytes()?)?;
    let all: Vec<_> = layout.flatten(&BoundBox::everything())?.collect();
    // Two shapes per leaf placement, seven placements, one fill
    assert_eq!(all.len(), 15);
    // Rotated placement comes first
    assert_eq!(all[0].bbox, BoundBox::new(80, 0, 100, 10));
    assert_eq!(all[0].layer, Layer::new(1, 0));
    assert_eq!(all[1].bbox, BoundBox::new(80, -2, 100, 2));
    assert_eq!(all[1].layer, Layer::new(2, 0));
    // Then the array, by rows
    assert_eq!(all[2].bbox, BoundBox::new(0, 0, 10, 20));
    assert_eq!(all[4].bbox, BoundBox::new(20, 0, 30, 20));
    assert_eq!(all[8].bbox, BoundBox::new(0, 30, 10, 50));
    assert_eq!(all[14].tag, Tag::Fill);
    // Repeated walks are identical
    let again: Vec<_> = layout.flatten(&BoundBox::everything())?.collect();
    assert_eq!(all, again);
    Ok(())
}
#[test]
fn flatten_filters() -> LayoutResult<()> {
    let layout = Layout::decode(&sample_bytes()?)?;
    let region = BoundBox::new(0, 0, 15, 15);
    assert_eq!(layout.flatten(&region)?.count(), 2);
    let rects: Vec<_> = layout
        .flatten(&region)?
        .layers([Layer::new(1, 0)])
        .collect();
    assert_eq!(rects.len(), 1);
    assert_eq!(rects[0].poly.as_rect(), Some(BoundBox::new(0, 0, 10, 20)));
    let none = layout
        .flatten(&BoundBox::new(500, 500, 600, 600))?
        .count();
    assert_eq!(none, 0);
    Ok(())
}
#[test]
fn views_flatten_many_regions() -> LayoutResult<()> {
    let layout = Layout::decode(&sample_bytes()?)?;
    let view = layout.flat_view()?;
    assert_eq!(view.bbox(), layout.bbox()?);
    assert_eq!(view.cell_bbox("leaf"), Some(&BoundBox::new(-2, 0, 10, 20)));
    for region in [
        BoundBox::everything(),
        BoundBox::new(0, 0, 15, 15),
        BoundBox::new(500, 500, 600, 600),
    ] {
        let viewed: Vec<_> = view.flatten(&region).collect();
        let direct: Vec<_> = layout.flatten(&region)?.collect();
        assert_eq!(viewed, direct);
    }
    Ok(())
}
#[test]
fn rejects_bad_hierarchies() -> LayoutResult<()> {
    let units = Units::new(1e-3, 1e-9);

    let mut layout = Layout::new("selfish", units.clone());
    let mut a = Cell::new("a");
    a.elems.push(Reference::new("a", Point::new(0, 0)).into());
    layout.add_cell(a)?;
    assert!(matches!(
        layout.validate(),
        Err(LayoutError::Hierarchy(HierarchyError::SelfReference { .. }))
    ));

    let mut layout = Layout::new("cyclic", units.clone());
    let mut a = Cell::new("a");
    a.elems.push(Reference::new("b", Point::new(0, 0)).into());
    let mut b = Cell::new("b");
    b.elems.push(Reference::new("a", Point::new(0, 0)).into());
    layout.add_cell(a)?;
    layout.add_cell(b)?;
    assert!(matches!(
        layout.validate(),
        Err(LayoutError::Hierarchy(HierarchyError::Cycle { .. }))
    ));
    assert!(layout.flatten(&BoundBox::everything()).is_err());
    assert!(layout.flat_view().is_err());

    let mut layout = Layout::new("dangling", units);
    let mut a = Cell::new("a");
    a.elems.push(Reference::new("missing", Point::new(0, 0)).into());
    layout.add_cell(a)?;
    match layout.validate() {
        Err(LayoutError::Hierarchy(HierarchyError::UndefinedCell { cell, parent })) => {
            assert_eq!(cell, "missing");
            assert_eq!(parent, "a");
        }
        other => panic!("unexpected {:?}", other),
    }
    // Decoding validates too
    let mut lib = GdsLibrary::new("dangling");
    let mut s = GdsStruct::new("a");
    s.elems.push(
        GdsStructRef {
            name: "missing".into(),
            ..Default::default()
        }
        .into(),
    );
    lib.structs.push(s);
    assert!(matches!(
        Layout::decode(&lib.to_bytes()?),
        Err(LayoutError::Hierarchy(_))
    ));
    Ok(())
}
#[test]
fn rejects_duplicate_cells() -> LayoutResult<()> {
    let mut layout = Layout::new("dup", Units::default());
    layout.add_cell(Cell::new("a"))?;
    assert!(layout.add_cell(Cell::new("a")).is_err());
    assert!(layout
        .insert_shape("b", Layer::new(1, 0), Tag::Design, Rect::default())
        .is_err());

    let mut lib = GdsLibrary::new("dup");
    lib.structs.push(GdsStruct::new("a"));
    lib.structs.push(GdsStruct::new("a"));
    match Layout::decode(&lib.to_bytes()?) {
        Err(LayoutError::Import { stack, .. }) => {
            assert_eq!(stack, vec![ErrorContext::Library("dup".into())]);
        }
        other => panic!("unexpected {:?}", other),
    }
    Ok(())
}
#[test]
fn rejects_malformed_bytes() {
    assert!(matches!(
        Layout::decode(b"not a gds file"),
        Err(LayoutError::Format(_))
    ));
}
#[test]
fn new_layouts_round_trip() -> LayoutResult<()> {
    let mut layout = Layout::new("fresh", Units::new(1e-3, 1e-9));
    layout.meta.dates = dates();
    let mut cell = Cell::new("top");
    cell.dates = dates();
    layout.add_cell(cell)?;
    layout.insert_shape(
        "top",
        Layer::new(5, 1),
        Tag::Fill,
        Polygon {
            points: vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)],
        },
    )?;
    layout.insert_shape(
        "top",
        Layer::new(5, 0),
        Tag::Design,
        Path {
            points: vec![Point::new(0, 0), Point::new(50, 0)],
            width: 2,
            ends: PathEnds::Custom { begin: 1, end: 3 },
        },
    )?;
    let decoded = Layout::decode(&layout.encode()?)?;
    assert_eq!(decoded, layout);
    // Coordinates beyond 32 bits do not export
    layout.insert_shape(
        "top",
        Layer::new(5, 0),
        Tag::Design,
        Rect::new(Point::new(0, 0), Point::new(1 << 40, 1)),
    )?;
    assert!(matches!(layout.encode(), Err(LayoutError::Export { .. })));
    Ok(())
}
#[test]
fn it_saves_and_opens() -> LayoutResult<()> {
    let layout = Layout::decode(&sample_bytes()?)?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sample.gds");
    layout.save(&path)?;
    let reopened = Layout::open(&path)?;
    assert_eq!(reopened, layout);
    Ok(())
}
