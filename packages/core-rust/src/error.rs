use thiserror::Error;

/// Errors from reading declared surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("surface source does not parse: {message}")]
    Syntax { message: String },
    #[error("type {name} declares more than one base type")]
    MultipleBases { name: String },
    #[error("type {name} carries a malformed marker: {message}")]
    Marker { name: String, message: String },
    #[error("catalog json is invalid: {message}")]
    Json { message: String },
    #[error("`{name}` is not a valid type name")]
    InvalidName { name: String },
}

/// Errors that leave a type without a usable factory.
///
/// Generation never fails as a whole: a type hitting one of these becomes
/// an inert placeholder carrying the error while other types proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("type {name} is not declared in the catalog")]
    UnknownType { name: String },
    #[error("base chain of {name} is cyclic: {}", chain.join(" -> "))]
    CyclicBase { name: String, chain: Vec<String> },
}
