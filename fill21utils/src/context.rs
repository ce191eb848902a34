/// Enumerated conversion contexts
/// Generally used for error reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    Library(String),
    Cell(String),
    Instance(String),
    Array(String),
    Units,
    Geometry,
    Text,
    Unknown,
}
