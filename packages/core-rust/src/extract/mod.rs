//! Extraction of operation and authorization descriptors from declared
//! surfaces.

pub mod authorization;
pub mod operation;
pub mod signature;

pub use authorization::extract_authorizations;
pub use operation::extract_operations;
pub use signature::{normalize_type, parse_signature, MethodSignature};
