use serde::{Deserialize, Serialize};

use super::kind::{AuthorizeOperation, OperationKind};

/// How a parameter is supplied when the operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterRole {
    /// Supplied by the caller and carried across process boundaries.
    Business,
    /// Resolved by the service provider on whichever side executes.
    Injected,
    /// Typed as the owning domain type; for writes, the target instance.
    SelfReference,
}

/// One classified parameter of an operation or authorization method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    /// Normalized declared-type text (see `extract::signature::normalize_type`).
    pub ty: String,
    pub role: ParameterRole,
}

impl ParameterDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: impl Into<String>, role: ParameterRole) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            role,
        }
    }

    #[must_use]
    pub fn is_injected(&self) -> bool {
        self.role == ParameterRole::Injected
    }

    #[must_use]
    pub fn is_self_reference(&self) -> bool {
        self.role == ParameterRole::SelfReference
    }
}

/// Return shape derived from the declared return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnShape {
    /// Plain value (or unit).
    Value,
    /// `bool` or `Result<bool, _>`: `false` means "not found / not done".
    Success,
    /// Awaitable producing a plain value.
    Awaitable,
    /// Awaitable producing a boolean success flag.
    AwaitableSuccess,
}

impl ReturnShape {
    #[must_use]
    pub const fn from_parts(awaitable: bool, success: bool) -> Self {
        match (awaitable, success) {
            (false, false) => Self::Value,
            (false, true) => Self::Success,
            (true, false) => Self::Awaitable,
            (true, true) => Self::AwaitableSuccess,
        }
    }

    #[must_use]
    pub const fn is_awaitable(self) -> bool {
        matches!(self, Self::Awaitable | Self::AwaitableSuccess)
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::AwaitableSuccess)
    }
}

/// One marker-bearing method on a domain type (or one of its bases).
///
/// A method carrying several kinds (`#[factory(insert, update)]`) yields one
/// descriptor per kind, all sharing the same `index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub kind: OperationKind,
    /// Type the method is declared on (the owning type or a base).
    pub declaring_type: String,
    /// Declared method name.
    pub method: String,
    /// Key the runtime binds the handler by; see [`Self::handler_key`].
    pub handler: String,
    /// Base name of the public factory method before collision resolution.
    pub public_name: String,
    pub shape: ReturnShape,
    /// Cross-process flag.
    pub remote: bool,
    /// Classified parameters in declaration order. Writes start with the
    /// implicit `target` self-reference.
    pub params: Vec<ParameterDescriptor>,
    /// Discovery order within the generation pass.
    pub index: usize,
}

impl OperationDescriptor {
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.kind.is_write()
    }

    /// Handler key: `DeclaringType::method`, or `DeclaringType::method/<n>`
    /// when the declaring type overloads the method, `n` counting the
    /// declared parameters. Overloads that also share that count are keyed
    /// by their parameter types instead: `DeclaringType::method(String, i32)`.
    #[must_use]
    pub fn handler_key(&self) -> &str {
        &self.handler
    }

    /// Parameters visible to callers: everything except injected ones and
    /// the implicit write target.
    pub fn public_params(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        let skip = usize::from(self.is_write());
        self.params
            .iter()
            .skip(skip)
            .filter(|p| !p.is_injected())
    }

    /// Parameters resolved through the service provider.
    pub fn injected_params(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.params.iter().filter(|p| p.is_injected())
    }

    /// Type signature of the caller-supplied parameters; Save grouping key.
    #[must_use]
    pub fn shape_key(&self) -> Vec<String> {
        self.public_params().map(|p| p.ty.clone()).collect()
    }
}

/// One governed-operation method on a policy surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorizationDescriptor {
    pub operations: AuthorizeOperation,
    /// Policy type declaring the method (the associated policy or a base).
    pub declaring_type: String,
    pub method: String,
    pub params: Vec<ParameterDescriptor>,
    pub remote: bool,
    pub awaitable: bool,
}

impl AuthorizationDescriptor {
    /// Check key: `PolicyType::method`.
    #[must_use]
    pub fn check_key(&self) -> String {
        format!("{}::{}", self.declaring_type, self.method)
    }
}
