//! Descriptor model shared by every pipeline stage.
//!
//! Descriptors are transient: each generation pass recreates them from the
//! declared surfaces, so none of them carry identity beyond their contents.

pub mod descriptor;
pub mod kind;

pub use descriptor::{
    AuthorizationDescriptor, OperationDescriptor, ParameterDescriptor, ParameterRole,
    ReturnShape,
};
pub use kind::{AuthorizeOperation, OperationFamily, OperationKind};
