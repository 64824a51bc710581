//! `opfactory` Core: declared surfaces, operation and authorization
//! extraction, binding, factory method synthesis and emission plans.

pub mod bind;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod generate;
pub mod model;
pub mod naming;
pub mod plan;
pub mod render;
pub mod surface;
pub mod synth;
pub mod types;

pub use bind::{ArgSource, AuthorizationBinding, BoundOperation};
pub use catalog::{BaseChain, Catalog};
pub use config::GeneratorConfig;
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
pub use error::{GenerationError, SurfaceError};
pub use generate::{GeneratedFactory, Generator};
pub use model::{
    AuthorizationDescriptor, AuthorizeOperation, OperationDescriptor, OperationFamily,
    OperationKind, ParameterDescriptor, ParameterRole, ReturnShape,
};
pub use plan::{
    Construction, DispatchEntry, FactoryPlan, MethodBody, MethodRole, OperationId, PathSet,
    PlannedMethod,
};
pub use surface::TypeSurface;
pub use synth::{FactoryMethodSpec, SaveBranch};
pub use types::{Entity, SaveState, Value};
