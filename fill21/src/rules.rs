//!
//! # Fill Rules
//!
//! Per-layer density targets and fill geometry, as loaded from YAML, JSON or TOML.
//!

// Std-Lib
use std::collections::HashMap;
use std::path::Path;

// Crates.io
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// Workspace Imports
use fill21raw::{BoundBox, ImportOptions, Int, Layer, Units};
use fill21utils::SerdeFile;

// Local imports
use crate::error::{FillError, FillResult};

/// Units of the lengths in a [RuleSet]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnits {
    /// Database units
    #[default]
    Db,
    /// The layout's user units, e.g. microns
    User,
}

///
/// # Fill Rule
///
/// Targets and fill geometry for one drawing layer.
/// Lengths are in the enclosing [RuleSet]'s [LengthUnits].
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FillRule {
    /// Drawing layer, as (number, datatype)
    pub layer: (i16, i16),
    /// Datatype for generated fill. Defaults to the drawing datatype.
    #[serde(default)]
    pub fill_datatype: Option<i16>,
    /// Layers whose shapes exclude fill, without counting toward density
    #[serde(default)]
    pub keepout: Vec<(i16, i16)>,
    pub min_density: f64,
    pub max_density: f64,
    /// Fill cell (width, height)
    pub fill_cell_size: (f64, f64),
    /// Clearance from design shapes and keep-out shapes
    pub fill_spacing: f64,
    /// Clearance between fill cells
    pub fill_to_fill_spacing: f64,
    /// Side length of the square density window
    pub window_size: f64,
    /// Window step. Defaults to `window_size`, i.e. no overlap.
    #[serde(default)]
    pub window_step: Option<f64>,
    /// Pitch of the candidate placement lattice
    pub grid_pitch: f64,
}

///
/// # Rule Set
///
/// The engine's full configuration: named [FillRule]s plus layout-wide settings.
///
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    #[serde(default)]
    pub units: LengthUnits,
    /// Layer whose bounding box sets the density extent
    #[serde(default)]
    pub boundary: Option<(i16, i16)>,
    /// Region (x0, y0, x1, y1) outside of which no fill is placed
    #[serde(default)]
    pub core: Option<[f64; 4]>,
    /// Tag all shapes on configured fill datatypes as fill, marked or not
    #[serde(default)]
    pub adopt_fill_datatypes: bool,
    #[serde(default)]
    pub rules: IndexMap<String, FillRule>,
}
impl SerdeFile for RuleSet {}

impl RuleSet {
    /// Load from file `fname`, its format selected by extension
    pub fn open(fname: impl AsRef<Path>) -> FillResult<Self> {
        let fname = fname.as_ref();
        <Self as SerdeFile>::open_any(fname)
            .map_err(|e| FillError::Config(format!("{}: {}", fname.display(), e)))
    }
    /// Check every rule for internal consistency, and all rules for conflicts with one another.
    pub fn validate(&self) -> FillResult<()> {
        if let Some([x0, y0, x1, y1]) = self.core {
            if !(x0 < x1 && y0 < y1) {
                return Err(FillError::Config(format!(
                    "Core region ({}, {}, {}, {}) is empty",
                    x0, y0, x1, y1
                )));
            }
        }
        let mut owners: HashMap<Layer, &str> = HashMap::new();
        for (name, rule) in self.rules.iter() {
            rule.validate(name)?;
            for layer in rule.measured() {
                if let Some(other) = owners.insert(layer, name.as_str()) {
                    return Err(FillError::rule(
                        name,
                        format!("layer {} is also measured by rule `{}`", layer, other),
                    ));
                }
            }
        }
        Ok(())
    }
    /// Options for importing layouts this rule set will operate on
    pub fn import_options(&self) -> ImportOptions {
        let mut fill_layers = Vec::new();
        if self.adopt_fill_datatypes {
            for rule in self.rules.values() {
                if let Some(dt) = rule.fill_datatype {
                    fill_layers.push(Layer::new(rule.layer.0, dt));
                }
            }
        }
        ImportOptions { fill_layers }
    }
    /// Convert to database units of `units`
    pub fn resolve(&self, units: &Units) -> FillResult<Resolved> {
        let scale = match self.units {
            LengthUnits::Db => 1.0,
            LengthUnits::User => units.user_to_db(),
        };
        if !(scale.is_finite() && scale > 0.0) {
            return Err(FillError::Config(format!(
                "Cannot convert lengths with scale {}",
                scale
            )));
        }
        let to_db = |v: f64| (v * scale).round() as Int;
        let core = self
            .core
            .map(|[x0, y0, x1, y1]| BoundBox::new(to_db(x0), to_db(y0), to_db(x1), to_db(y1)));
        let rules = self
            .rules
            .iter()
            .map(|(name, rule)| rule.resolve(name, &to_db))
            .collect::<FillResult<Vec<_>>>()?;
        Ok(Resolved {
            boundary: self.boundary.map(|(n, d)| Layer::new(n, d)),
            core,
            rules,
        })
    }
}

impl FillRule {
    pub fn drawing_layer(&self) -> Layer {
        Layer::new(self.layer.0, self.layer.1)
    }
    pub fn fill_layer(&self) -> Layer {
        Layer::new(self.layer.0, self.fill_datatype.unwrap_or(self.layer.1))
    }
    /// Layers counted toward our density
    pub fn measured(&self) -> Vec<Layer> {
        let (drawing, fill) = (self.drawing_layer(), self.fill_layer());
        if drawing == fill {
            vec![drawing]
        } else {
            vec![drawing, fill]
        }
    }
    fn validate(&self, name: &str) -> FillResult<()> {
        let fail = |reason: String| Err(FillError::rule(name, reason));
        let (min, max) = (self.min_density, self.max_density);
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) {
            return fail(format!("densities {} and {} must lie in [0, 1]", min, max));
        }
        if min > max {
            return fail(format!("min_density {} exceeds max_density {}", min, max));
        }
        let (w, h) = self.fill_cell_size;
        if !(w > 0.0 && h > 0.0) {
            return fail(format!("fill_cell_size ({}, {}) must be positive", w, h));
        }
        if !(self.grid_pitch > 0.0) {
            return fail(format!("grid_pitch {} must be positive", self.grid_pitch));
        }
        if !(self.window_size > 0.0) {
            return fail(format!("window_size {} must be positive", self.window_size));
        }
        if let Some(step) = self.window_step {
            if !(step > 0.0) {
                return fail(format!("window_step {} must be positive", step));
            }
            if step > self.window_size {
                return fail(format!(
                    "window_step {} exceeds window_size {}",
                    step, self.window_size
                ));
            }
        }
        if !(self.fill_spacing >= 0.0 && self.fill_to_fill_spacing >= 0.0) {
            return fail("spacings must be non-negative".into());
        }
        if self.keepout.iter().any(|l| {
            let l = Layer::new(l.0, l.1);
            self.measured().contains(&l)
        }) {
            return fail("keep-out layers cannot also be measured".into());
        }
        Ok(())
    }
    fn resolve(&self, name: &str, to_db: &impl Fn(f64) -> Int) -> FillResult<LayerRule> {
        let rule = LayerRule {
            name: name.to_string(),
            layer: self.drawing_layer(),
            fill_layer: self.fill_layer(),
            keepout: self.keepout.iter().map(|l| Layer::new(l.0, l.1)).collect(),
            min_density: self.min_density,
            max_density: self.max_density,
            cell: (to_db(self.fill_cell_size.0), to_db(self.fill_cell_size.1)),
            spacing: to_db(self.fill_spacing),
            fill_spacing: to_db(self.fill_to_fill_spacing),
            window: to_db(self.window_size),
            step: to_db(self.window_step.unwrap_or(self.window_size)),
            pitch: to_db(self.grid_pitch),
        };
        if rule.cell.0 <= 0 || rule.cell.1 <= 0 || rule.window <= 0 || rule.step <= 0 {
            return Err(FillError::rule(name, "sizes round to zero database units"));
        }
        if rule.pitch <= 0 {
            return Err(FillError::rule(name, "grid_pitch rounds to zero database units"));
        }
        Ok(rule)
    }
}

/// # Resolved Rule Set
/// A [RuleSet] in database units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub boundary: Option<Layer>,
    pub core: Option<BoundBox>,
    pub rules: Vec<LayerRule>,
}

/// # Layer Rule
/// A [FillRule] in database units.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRule {
    pub name: String,
    pub layer: Layer,
    /// Layer new fill is placed on
    pub fill_layer: Layer,
    pub keepout: Vec<Layer>,
    pub min_density: f64,
    pub max_density: f64,
    /// Fill cell (width, height)
    pub cell: (Int, Int),
    /// Fill-to-design spacing
    pub spacing: Int,
    /// Fill-to-fill spacing
    pub fill_spacing: Int,
    pub window: Int,
    pub step: Int,
    pub pitch: Int,
}
impl LayerRule {
    /// Layers counted toward our density
    pub fn measured(&self) -> Vec<Layer> {
        if self.layer == self.fill_layer {
            vec![self.layer]
        } else {
            vec![self.layer, self.fill_layer]
        }
    }
    /// Layers of every shape relevant to filling: measured and keep-out
    pub fn indexed(&self) -> Vec<Layer> {
        let mut layers = self.measured();
        layers.extend(self.keepout.iter().copied());
        layers
    }
}
