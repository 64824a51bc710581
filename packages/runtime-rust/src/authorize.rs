//! Authorization gate: the bound checks of one operation, evaluated in
//! declaration order and stopping at the first denial.

use std::collections::HashMap;
use std::sync::Arc;

use opfactory_core::{
    ArgSource, AuthorizationBinding, AuthorizationDescriptor, Entity, OperationDescriptor,
    OperationKind, Value,
};

use crate::error::FactoryError;
use crate::handlers::{AuthorizationCall, AuthorizationCheck, Authorized};
use crate::services::Services;

/// Where one check argument is read from at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgSlot {
    Target,
    /// Position in the caller-supplied argument list.
    Caller(usize),
    /// Injected operation parameter; the value travels in `services`.
    Injected,
}

struct BoundCheck {
    key: String,
    slots: Vec<ArgSlot>,
    check: Arc<dyn AuthorizationCheck>,
}

/// Sequential short-circuit AND over the checks bound to one operation.
pub struct AuthorizationGate {
    kind: OperationKind,
    checks: Vec<BoundCheck>,
}

impl AuthorizationGate {
    /// Resolves every binding to its registered check.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::MissingCheck` when a bound policy method has no
    /// registered check.
    pub(crate) fn build(
        operation: &OperationDescriptor,
        bindings: &[AuthorizationBinding],
        authorizations: &[AuthorizationDescriptor],
        registered: &HashMap<String, Arc<dyn AuthorizationCheck>>,
    ) -> Result<Self, FactoryError> {
        let mut checks = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let key = authorizations
                .get(binding.authorization)
                .map(AuthorizationDescriptor::check_key)
                .ok_or_else(|| FactoryError::MissingCheck {
                    key: format!("#{}", binding.authorization),
                })?;
            let check = registered
                .get(&key)
                .cloned()
                .ok_or_else(|| FactoryError::MissingCheck { key: key.clone() })?;
            let slots = binding
                .args
                .iter()
                .map(|source| match *source {
                    ArgSource::Target => ArgSlot::Target,
                    ArgSource::Param(i) => {
                        caller_position(operation, i).map_or(ArgSlot::Injected, ArgSlot::Caller)
                    }
                })
                .collect();
            checks.push(BoundCheck { key, slots, check });
        }
        Ok(Self {
            kind: operation.kind,
            checks,
        })
    }

    /// Evaluates the checks in order. The first denial is returned as is and
    /// nothing after it runs.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a check.
    pub async fn evaluate(
        &self,
        target: Option<&Entity>,
        args: &[Value],
        services: &Services,
    ) -> anyhow::Result<Authorized> {
        for bound in &self.checks {
            let needs_target = bound.slots.contains(&ArgSlot::Target);
            let call = AuthorizationCall {
                check: bound.key.clone(),
                kind: self.kind,
                target: if needs_target { target.cloned() } else { None },
                args: bound
                    .slots
                    .iter()
                    .map(|slot| match slot {
                        ArgSlot::Caller(i) => args.get(*i).cloned().unwrap_or(Value::Null),
                        ArgSlot::Target | ArgSlot::Injected => Value::Null,
                    })
                    .collect(),
                services: services.clone(),
            };
            let outcome = bound.check.check(call).await?;
            if !outcome.allowed {
                tracing::debug!(check = %bound.key, kind = %self.kind, "authorization denied");
                return Ok(outcome);
            }
        }
        Ok(Authorized::allow())
    }
}

/// Maps a position in `OperationDescriptor::params` to its position among
/// the caller-supplied arguments. `None` for the write target and injected
/// parameters.
pub(crate) fn caller_position(operation: &OperationDescriptor, index: usize) -> Option<usize> {
    let skip = usize::from(operation.is_write());
    if index < skip || operation.params.get(index)?.is_injected() {
        return None;
    }
    Some(
        operation.params[skip..index]
            .iter()
            .filter(|p| !p.is_injected())
            .count(),
    )
}
