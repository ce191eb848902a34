//!
//! # Fill21 Raw Layout
//!
//! The geometric layer of the Fill21 density and fill engine.
//! Interprets GDSII libraries from [fill21gds] as [Layout]s of [Cell]s,
//! holding [Shape]s, [Reference]s to other cells, and carried-through non-geometric content.
//!
//! Every shape carries a [Tag], distinguishing design content from generated fill.
//! Fill is marked in GDSII by a property, attribute [FILL_MARKER_ATTR] with value [FILL_MARKER_VALUE].
//!
//! Hierarchical layouts are viewed flat through [Layout::flatten], which yields absolute-coordinate polygons.
//! Area and distance primitives live in the [clip] module.
//!
//! Round-trips through [Layout::decode] and [Layout::encode] preserve the bytes of every unmodified element.
//!

pub mod bbox;
pub mod clip;
pub mod data;
pub mod error;
pub mod flatten;
pub mod gds;
pub mod geom;

pub use bbox::*;
pub use data::*;
pub use error::*;
pub use flatten::*;
pub use gds::*;
pub use geom::*;

// Re-exports
pub use fill21gds as gds21;
pub use fill21utils as utils;

/// Integer coordinate type, in database units
pub type Int = i64;

#[cfg(test)]
mod tests;
