//!
//! # Layout Result and Error Types
//!

// Local Imports
use crate::gds21::GdsError;
pub use crate::utils::{self, ErrorContext};

/// # [LayoutError] Result Type
pub type LayoutResult<T> = Result<T, LayoutError>;

///
/// # Layout Error Enumeration
///
pub enum LayoutError {
    /// Malformed or Unsupported GDSII Content
    Format(GdsError),
    /// Invalid Cell Hierarchy
    Hierarchy(HierarchyError),
    /// Error Exporting to GDSII
    Export {
        message: String,
        stack: Vec<ErrorContext>,
    },
    /// Error Importing from GDSII
    Import {
        message: String,
        stack: Vec<ErrorContext>,
    },
    /// Boxed External Errors
    Boxed(Box<dyn std::error::Error + Send + Sync>),
    /// Uncategorized Error, with String Message
    Str(String),
}
impl LayoutError {
    /// Create a [LayoutError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
    /// Create an error-variant [Result] of our [LayoutError::Str] variant from anything String-convertible
    pub fn fail<T>(s: impl Into<String>) -> Result<T, Self> {
        Err(Self::msg(s))
    }
}
impl std::fmt::Debug for LayoutError {
    /// Display a [LayoutError]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LayoutError::Format(err) => write!(f, "GDSII Format Error: {}", err),
            LayoutError::Hierarchy(err) => write!(f, "Hierarchy Error: {}", err),
            LayoutError::Export { message, stack } => {
                write!(f, "Export Error: \n - {} \n - {:?}", message, stack)
            }
            LayoutError::Import { message, stack } => {
                write!(f, "Import Error: \n - {} \n - {:?}", message, stack)
            }
            LayoutError::Boxed(err) => err.fmt(f),
            LayoutError::Str(err) => err.fmt(f),
        }
    }
}
impl std::fmt::Display for LayoutError {
    /// Display a [LayoutError]
    /// Delegates to the [Debug] implementation
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            Self::Hierarchy(e) => Some(e),
            Self::Boxed(e) => Some(&**e),
            _ => None,
        }
    }
}
impl From<GdsError> for LayoutError {
    fn from(e: GdsError) -> Self {
        Self::Format(e)
    }
}
impl From<HierarchyError> for LayoutError {
    fn from(e: HierarchyError) -> Self {
        Self::Hierarchy(e)
    }
}
impl From<String> for LayoutError {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}
impl From<&str> for LayoutError {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}
impl From<std::io::Error> for LayoutError {
    fn from(e: std::io::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<utils::ser::Error> for LayoutError {
    fn from(e: utils::ser::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}

///
/// # Cell-Hierarchy Errors
///
/// Reported by [crate::Layout::validate] and anything else which walks the hierarchy.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// A cell which instantiates itself
    SelfReference { cell: String },
    /// A longer cycle of instances, through `cell`
    Cycle { cell: String },
    /// An instance of an undefined cell, named `cell`, placed within `parent`
    UndefinedCell { cell: String, parent: String },
}
impl std::fmt::Display for HierarchyError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::SelfReference { cell } => write!(f, "cell `{}` instantiates itself", cell),
            Self::Cycle { cell } => write!(f, "instance cycle through cell `{}`", cell),
            Self::UndefinedCell { cell, parent } => {
                write!(f, "cell `{}` instantiates undefined cell `{}`", parent, cell)
            }
        }
    }
}
impl std::error::Error for HierarchyError {}
