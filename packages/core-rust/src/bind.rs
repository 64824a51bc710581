//! Authorization binding.
//!
//! Pairs every operation with every authorization whose governed-operation
//! mask covers it and whose parameter list lines up with the operation's.
//! The walk records where each authorization argument comes from so the
//! runtime can assemble the call without repeating the analysis.

use serde::{Deserialize, Serialize};

use crate::extract::signature::strip_references;
use crate::model::{AuthorizationDescriptor, OperationDescriptor, ParameterDescriptor};

/// Origin of one authorization argument at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgSource {
    /// The write's target instance.
    Target,
    /// The operation parameter at this position of `OperationDescriptor::params`.
    Param(usize),
}

/// One authorization bound to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorizationBinding {
    /// Position in the type's authorization list.
    pub authorization: usize,
    /// One entry per authorization parameter.
    pub args: Vec<ArgSource>,
}

impl AuthorizationBinding {
    /// True when evaluating this authorization needs the target instance.
    #[must_use]
    pub fn needs_target(&self) -> bool {
        self.args.contains(&ArgSource::Target)
    }
}

/// An operation with the authorizations that gate it, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundOperation {
    pub operation: OperationDescriptor,
    pub bindings: Vec<AuthorizationBinding>,
}

impl BoundOperation {
    #[must_use]
    pub fn is_gated(&self) -> bool {
        !self.bindings.is_empty()
    }
}

/// True when the authorization's mask covers the operation's kind or family.
#[must_use]
pub fn flags_compatible(op: &OperationDescriptor, auth: &AuthorizationDescriptor) -> bool {
    auth.operations.governs(op.kind)
}

/// Walks both parameter lists left to right.
///
/// Operation-side self references are skipped, except on a write whose
/// current authorization parameter is also a self reference: then both are
/// consumed together. Remaining pairs must agree on type. The authorization
/// list may be shorter than the operation's, never longer.
#[must_use]
pub fn match_parameters(
    op: &OperationDescriptor,
    auth: &AuthorizationDescriptor,
) -> Option<Vec<ArgSource>> {
    let mut args = Vec::with_capacity(auth.params.len());
    let mut op_pos = 0;

    for auth_param in &auth.params {
        loop {
            let op_param = op.params.get(op_pos)?;
            if !op_param.is_self_reference() {
                break;
            }
            if op.is_write() && auth_param.is_self_reference() {
                break;
            }
            op_pos += 1;
        }

        let op_param = &op.params[op_pos];
        if op_param.is_self_reference() {
            // Lockstep self-reference pair on a write.
            args.push(if op_pos == 0 {
                ArgSource::Target
            } else {
                ArgSource::Param(op_pos)
            });
        } else if same_type(op_param, auth_param) {
            args.push(ArgSource::Param(op_pos));
        } else {
            return None;
        }
        op_pos += 1;
    }

    Some(args)
}

fn same_type(a: &ParameterDescriptor, b: &ParameterDescriptor) -> bool {
    strip_references(&a.ty) == strip_references(&b.ty)
}

/// Binds every operation against every authorization.
#[must_use]
pub fn bind(
    operations: Vec<OperationDescriptor>,
    authorizations: &[AuthorizationDescriptor],
) -> Vec<BoundOperation> {
    operations
        .into_iter()
        .map(|operation| {
            let bindings: Vec<_> = authorizations
                .iter()
                .enumerate()
                .filter(|(_, auth)| flags_compatible(&operation, auth))
                .filter_map(|(authorization, auth)| {
                    match_parameters(&operation, auth).map(|args| AuthorizationBinding {
                        authorization,
                        args,
                    })
                })
                .collect();
            tracing::debug!(
                operation = %operation.handler_key(),
                kind = %operation.kind,
                bindings = bindings.len(),
                "bound operation"
            );
            BoundOperation {
                operation,
                bindings,
            }
        })
        .collect()
}
