//!
//! # Fill21 Error Types
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Workspace Imports
use fill21gds::GdsError;
use fill21raw::{BoundBox, HierarchyError, Layer, LayoutError};
use fill21utils::ser;

/// # [FillError] Result Type
pub type FillResult<T> = Result<T, FillError>;

/// # Fill Error
///
/// Everything fatal to a density, fill or erase run.
/// None of these leave partially-written output behind.
#[derive(thiserror::Error, Debug)]
pub enum FillError {
    /// Malformed or unsupported GDSII input
    #[error("format error: {0}")]
    Format(#[from] GdsError),
    /// Invalid cell hierarchy
    #[error("hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),
    /// Other errors from the layout model
    #[error(transparent)]
    Layout(LayoutError),
    /// Self-contradictory fill rule
    #[error("invalid rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: String },
    /// Unreadable or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
impl FillError {
    /// Create a [FillError::InvalidRule]
    pub fn rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
impl From<LayoutError> for FillError {
    /// Lift format and hierarchy errors to their own variants
    fn from(e: LayoutError) -> Self {
        match e {
            LayoutError::Format(e) => Self::Format(e),
            LayoutError::Hierarchy(e) => Self::Hierarchy(e),
            e => Self::Layout(e),
        }
    }
}
impl From<ser::Error> for FillError {
    fn from(e: ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

///
/// # Saturation Warning
///
/// A density window which fill could not raise to its rule's minimum.
/// Non-fatal: collected per layer, logged, and reported after all layers complete.
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaturationWarning {
    /// Rule name
    pub rule: String,
    pub layer: Layer,
    pub window: BoundBox,
    /// Density reached, including any fill added
    pub density: f64,
    /// The rule's minimum density
    pub target: f64,
}
impl std::fmt::Display for SaturationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): window ({}, {}) - ({}, {}) saturated at {:.2} %, below target {:.2} %",
            self.rule,
            self.layer,
            self.window.p0.x,
            self.window.p0.y,
            self.window.p1.x,
            self.window.p1.y,
            100.0 * self.density,
            100.0 * self.target,
        )
    }
}
