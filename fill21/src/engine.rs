//!
//! # Fill Engine
//!
//! Density, fill and erase operations over a [Layout], configured by a [RuleSet].
//!

// Std-Lib
use std::path::Path;

// Crates.io
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

// Workspace Imports
use fill21raw::{ImportOptions, Layout, Tag};

// Local imports
use crate::density::{self, DensityReport};
use crate::erase;
use crate::error::{FillError, FillResult, SaturationWarning};
use crate::fill::{fill_layer, LayerFill};
use crate::rules::{Resolved, RuleSet};

///
/// # Fill Outcome
///
/// Fill generated for each rule, ordered by layer.
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FillOutcome {
    pub layers: Vec<LayerFill>,
}
impl FillOutcome {
    /// Total number of fill cells
    pub fn inserted(&self) -> usize {
        self.layers.iter().map(|l| l.rects.len()).sum()
    }
    /// All saturation warnings, by layer
    pub fn warnings(&self) -> Vec<SaturationWarning> {
        self.layers
            .iter()
            .flat_map(|l| l.warnings.iter().cloned())
            .collect()
    }
    /// Densities before fill
    pub fn before(&self) -> DensityReport {
        DensityReport {
            layers: self.layers.iter().map(|l| l.before.clone()).collect(),
        }
    }
    /// Densities after fill
    pub fn after(&self) -> DensityReport {
        DensityReport {
            layers: self.layers.iter().map(|l| l.after.clone()).collect(),
        }
    }
}

///
/// # Engine
///
/// Holds a validated [RuleSet]. Every operation resolves it against the units of the layout at hand.
///
#[derive(Debug, Clone, Default)]
pub struct Engine {
    rules: RuleSet,
}
impl Engine {
    /// Create an [Engine], validating `rules`
    pub fn new(rules: RuleSet) -> FillResult<Self> {
        rules.validate()?;
        Ok(Self { rules })
    }
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
    pub fn import_options(&self) -> ImportOptions {
        self.rules.import_options()
    }
    /// Open and decode GDSII file `fname`
    pub fn open(&self, fname: impl AsRef<Path>) -> FillResult<Layout> {
        Ok(Layout::open_with(fname, self.import_options())?)
    }
    /// Decode GDSII `bytes`
    pub fn decode(&self, bytes: &[u8]) -> FillResult<Layout> {
        Ok(Layout::decode_with(bytes, self.import_options())?)
    }
    fn resolve(&self, layout: &Layout) -> FillResult<Resolved> {
        self.rules.resolve(&layout.units)
    }
    /// Measure the density of every rule's layers, or without rules, of every layer
    pub fn compute_density(&self, layout: &Layout) -> FillResult<DensityReport> {
        let resolved = self.resolve(layout)?;
        Ok(density::compute_density(&layout.flat_view()?, &resolved))
    }
    /// Generate fill for every rule, without modifying `layout`.
    /// Rules run in parallel, and are joined before returning.
    pub fn plan(&self, layout: &Layout) -> FillResult<FillOutcome> {
        let resolved = self.resolve(layout)?;
        let view = layout.flat_view()?;
        let extent = density::extent(&view, resolved.boundary);
        let core = resolved.core.as_ref();
        let mut layers: Vec<LayerFill> = resolved
            .rules
            .par_iter()
            .map(|rule| fill_layer(&view, rule, &extent, core))
            .collect();
        layers.sort_by_key(|l| l.layer);
        Ok(FillOutcome { layers })
    }
    /// Insert the fill of `outcome` into the top cell of `layout`. Returns the number of shapes added.
    pub fn apply(layout: &mut Layout, outcome: &FillOutcome) -> FillResult<usize> {
        if outcome.inserted() == 0 {
            return Ok(0);
        }
        let top = match layout.top_cell() {
            Some(t) => t.to_string(),
            None => return Err(FillError::Config("Layout has no top cell".into())),
        };
        for layer in outcome.layers.iter() {
            for rect in layer.rects.iter() {
                layout.insert_shape(&top, layer.fill_layer, Tag::Fill, rect.clone())?;
            }
        }
        info!(cell = %top, inserted = outcome.inserted(), "Applied fill");
        Ok(outcome.inserted())
    }
    /// Generate and insert fill for every rule
    pub fn fill(&self, layout: &mut Layout) -> FillResult<FillOutcome> {
        let outcome = self.plan(layout)?;
        Self::apply(layout, &outcome)?;
        Ok(outcome)
    }
    /// Remove all fill. Returns the number of shapes removed.
    pub fn erase(&self, layout: &mut Layout) -> usize {
        erase::erase(layout)
    }
}
