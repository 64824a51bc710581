//! Contracts for the code a factory runs: method handlers, authorization
//! checks and lifecycle hooks.
//!
//! Handlers and checks have blanket implementations for async closures, so
//! most callers register plain closures.

use std::future::Future;

use async_trait::async_trait;
use opfactory_core::{Entity, OperationDescriptor, OperationKind, Value};
use serde::{Deserialize, Serialize};

use crate::path::Output;
use crate::services::Services;

static NULL: Value = Value::Null;

// ---------------------------------------------------------------------------
// Method handlers
// ---------------------------------------------------------------------------

/// Input of one operation body.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Receiver: a fresh instance for Create and Fetch, the caller's target
    /// for writes, none for Execute.
    pub target: Option<Entity>,
    /// Caller-supplied values in declaration order.
    pub args: Vec<Value>,
    /// Injected parameters, keyed by parameter name.
    pub services: Services,
}

impl Invocation {
    /// Argument at `index`, or `Value::Null` when absent.
    #[must_use]
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&NULL)
    }
}

/// Result of one operation body.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The receiver after the body ran.
    pub target: Option<Entity>,
    /// Return value; `Bool(false)` means "not found" for success-shaped
    /// operations.
    pub value: Value,
}

impl Completion {
    /// The body finished with its receiver and a unit result.
    #[must_use]
    pub fn done(target: Option<Entity>) -> Self {
        Self {
            target,
            value: Value::Null,
        }
    }

    /// The body reports success or "not found" through a flag.
    #[must_use]
    pub fn success(target: Option<Entity>, found: bool) -> Self {
        Self {
            target,
            value: Value::Bool(found),
        }
    }

    /// A receiver-less result, as produced by Execute operations.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            target: None,
            value: value.into(),
        }
    }
}

/// Body of one declared operation method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> anyhow::Result<Completion>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Completion>> + Send + 'static,
{
    async fn invoke(&self, invocation: Invocation) -> anyhow::Result<Completion> {
        self(invocation).await
    }
}

// ---------------------------------------------------------------------------
// Authorization checks
// ---------------------------------------------------------------------------

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorized {
    pub allowed: bool,
    /// Reason given by the check, usually only on denial.
    pub message: Option<String>,
}

impl Authorized {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
        }
    }

    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: Some(message.into()),
        }
    }
}

impl From<bool> for Authorized {
    fn from(allowed: bool) -> Self {
        Self {
            allowed,
            message: None,
        }
    }
}

/// Input of one authorization check.
#[derive(Debug, Clone)]
pub struct AuthorizationCall {
    /// `PolicyType::method` of the check being evaluated.
    pub check: String,
    /// Kind of the operation being gated.
    pub kind: OperationKind,
    /// The write's target when the check declares it.
    pub target: Option<Entity>,
    /// One value per check parameter; the target and injected slots are
    /// `Value::Null`.
    pub args: Vec<Value>,
    /// Injected parameters of the gated operation.
    pub services: Services,
}

/// Decision function behind one policy method.
#[async_trait]
pub trait AuthorizationCheck: Send + Sync {
    async fn check(&self, call: AuthorizationCall) -> anyhow::Result<Authorized>;
}

#[async_trait]
impl<F, Fut> AuthorizationCheck for F
where
    F: Fn(AuthorizationCall) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Authorized>> + Send + 'static,
{
    async fn check(&self, call: AuthorizationCall) -> anyhow::Result<Authorized> {
        self(call).await
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Lifecycle hooks run around every local invocation. Both default to
/// doing nothing.
#[async_trait]
pub trait FactoryHooks: Send + Sync {
    async fn before(
        &self,
        _operation: &OperationDescriptor,
        _target: Option<&Entity>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after(
        &self,
        _operation: &OperationDescriptor,
        _output: Option<&Output>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl FactoryHooks for NoHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = |inv: Invocation| async move {
            let id = inv.arg(0).clone();
            let mut target = inv.target.unwrap_or_else(|| Entity::new("Person"));
            target.set("id", id);
            Ok::<_, anyhow::Error>(Completion::done(Some(target)))
        };
        let done = handler
            .invoke(Invocation {
                target: None,
                args: vec![Value::Int(7)],
                services: Services::new(),
            })
            .await
            .unwrap();
        assert_eq!(done.target.unwrap().get("id"), Some(&Value::Int(7)));
    }

    #[tokio::test]
    async fn closures_are_checks() {
        let check = |call: AuthorizationCall| async move {
            Ok::<_, anyhow::Error>(Authorized::from(call.args.first() == Some(&Value::Int(1))))
        };
        let call = AuthorizationCall {
            check: "PersonAuth::can_fetch".to_string(),
            kind: OperationKind::Fetch,
            target: None,
            args: vec![Value::Int(2)],
            services: Services::new(),
        };
        assert!(!check.check(call).await.unwrap().allowed);
    }

    #[test]
    fn missing_arg_reads_as_null() {
        let inv = Invocation {
            target: None,
            args: vec![],
            services: Services::new(),
        };
        assert_eq!(inv.arg(3), &Value::Null);
    }
}
