//!
//! # Fill Removal
//!

// Crates.io
use tracing::{debug, info};

// Workspace Imports
use fill21raw::{Layout, Tag};

/// Remove every [Tag::Fill] shape, from every cell. Returns the number removed.
/// Design shapes, references and passthrough content are untouched.
pub fn erase(layout: &mut Layout) -> usize {
    let mut total = 0;
    for cell in layout.cells.values_mut() {
        let removed = cell.remove_shapes(|s| s.tag == Tag::Fill);
        if removed > 0 {
            debug!(cell = %cell.name, removed, "Erased fill");
        }
        total += removed;
    }
    info!(removed = total, "Erase complete");
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use fill21raw::{Cell, Layer, LayoutResult, Point, Rect, Reference, ShapeElem, Units};

    #[test]
    fn erases_only_fill() -> LayoutResult<()> {
        let mut layout = Layout::new("lib", Units::new(1e-3, 1e-9));
        let rect = |x| Rect::new(Point::new(x, 0), Point::new(x + 10, 10));
        let mut leaf = Cell::new("leaf");
        leaf.elems.push(ShapeElem::new(Layer::new(1, 0), Tag::Fill, rect(0)).into());
        leaf.elems.push(ShapeElem::new(Layer::new(1, 0), Tag::Design, rect(20)).into());
        let mut top = Cell::new("top");
        top.elems.push(Reference::new("leaf", Point::new(0, 0)).into());
        top.elems.push(ShapeElem::new(Layer::new(2, 0), Tag::Fill, rect(40)).into());
        layout.add_cell(leaf)?;
        layout.add_cell(top)?;

        assert_eq!(erase(&mut layout), 2);
        let erased = layout.clone();
        assert_eq!(layout.cells["leaf"].elems.len(), 1);
        assert_eq!(layout.cells["top"].references().count(), 1);
        // Idempotent
        assert_eq!(erase(&mut layout), 0);
        assert_eq!(layout, erased);
        Ok(())
    }
}
