//!
//! # Fill21
//!
//! Layout density analysis and dummy-fill insertion for GDSII layouts.
//!
//! The [Engine] offers three operations over a [fill21raw::Layout]:
//! * [Engine::compute_density] measures windowed per-layer density,
//! * [Engine::fill] inserts fill cells until each window reaches its rule's minimum density,
//! * [Engine::erase] removes all previously inserted fill.
//!
//! Each is configured by a [RuleSet], typically loaded from YAML.
//!

pub mod cli;
pub mod density;
pub mod engine;
pub mod erase;
pub mod error;
pub mod fill;
pub mod index;
pub mod rules;

pub use density::{DensityReport, LayerDensity, WindowDensity, WindowGrid};
pub use engine::*;
pub use error::*;
pub use fill::{LayerFill, TOLERANCE};
pub use index::{ShapeKey, SpatialIndex};
pub use rules::*;

// Re-exports
pub use fill21raw as raw;
