//!
//! # Fill21 GDSII Reader & Writer
//!
//! The binary layer of the Fill21 density and fill engine.
//! Fill21gds stores layout data on GDSII's terms, using GDSII's idioms and naming conventions,
//! and leaves geometric interpretation to `fill21raw`.
//!
//! Layout data is represented in three primary forms:
//!
//! * A short tree with three layers:
//!   * The root is a [GdsLibrary], which primarily consists of a set of cells ([GdsStruct]s), and secondarily a set of metadata.
//!   * Libraries consist of cell definitions AKA [GdsStruct]s.
//!   * Cells consist of [GdsElement]s, an enumeration which includes polygons ([GdsBoundary]),
//!     instances of other cells ([GdsStructRef], [GdsArrayRef]), text ([GdsTextElem]), and a few other geometric elements.
//! * For storage on disk, the [GdsLibrary] tree is flattened to a series of [GdsRecord]s.
//! * Records are stored on-disk in binary form, each with a length, record-type, and data-type header.
//!
//! ## Fidelity
//!
//! Reading and re-writing a library with no modifications produces identical bytes.
//! Three mechanisms keep it so:
//!
//! * Each decoded element retains its source bytes ([GdsSource]), and [GdsWriter] re-emits them
//!   for as long as they decode to an equal element.
//!   Uninterpreted records within elements survive this way.
//! * Uninterpreted library-level records are kept as [GdsPassthrough] blocks,
//!   and uninterpreted records between elements as [GdsOpaque] elements.
//! * The encodings of [GdsUnits] are retained, along with any bytes following `ENDLIB`.
//!
//! ## Usage
//!
//! Creating a new and empty [GdsLibrary], adding a [GdsStruct] cell-definition,
//! and reading it back from its encoded bytes:
//!
//! ```
//! use fill21gds::{GdsLibrary, GdsStruct};
//! let mut lib = GdsLibrary::new("mylib");
//! lib.structs.push(GdsStruct::new("mycell"));
//! let bytes = lib.to_bytes().unwrap();
//! assert_eq!(GdsLibrary::from_bytes(&bytes).unwrap(), lib);
//! ```
//!
//! Loading from and saving to disk:
//!
//! ```skip
//! let lib = GdsLibrary::open("sample.gds")?;
//! lib.save("copy.gds")?;
//! ```
//!

pub mod data;
pub use data::*;
pub mod read;
pub use read::*;
pub mod write;
pub use write::*;

#[cfg(test)]
mod tests;
