//! Call paths.
//!
//! Every public factory method is bound, when the factory is built, to one
//! [`OperationPath`]: in process ([`LocalPath`], [`ProbePath`]) or across a
//! process boundary ([`RemotePath`]). Callers never branch on the path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opfactory_core::{Entity, OperationDescriptor, OperationId, OperationKind, Value};
use serde::{Deserialize, Serialize};

use crate::authorize::AuthorizationGate;
use crate::dispatch::{RemoteDispatcher, RemoteRequest};
use crate::error::FactoryError;
use crate::handlers::{Authorized, FactoryHooks, Invocation, MethodHandler};
use crate::services::{ServiceProvider, Services};

/// What a completed operation hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    /// The receiver instance: created, fetched or written.
    Instance(Entity),
    /// The result of an Execute operation.
    Value(Value),
}

impl Output {
    #[must_use]
    pub fn instance(&self) -> Option<&Entity> {
        match self {
            Self::Instance(entity) => Some(entity),
            Self::Value(_) => None,
        }
    }

    #[must_use]
    pub fn into_instance(self) -> Option<Entity> {
        match self {
            Self::Instance(entity) => Some(entity),
            Self::Value(_) => None,
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Instance(_) => None,
        }
    }
}

/// Result of running one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// The body ran. `None` is "not found" or a no-op.
    Completed(Option<Output>),
    /// A bound check denied the call; the body did not run.
    Denied(Authorized),
    /// Result of a probe.
    Probed(Authorized),
}

/// Arguments of one path invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathCall {
    pub target: Option<Entity>,
    /// Caller-supplied values; injected parameters are never included.
    pub args: Vec<Value>,
}

/// One way of running a factory method.
#[async_trait]
pub trait OperationPath: Send + Sync {
    async fn run(&self, call: PathCall) -> Result<Reply, FactoryError>;
}

fn resolve_services(
    operation: &OperationDescriptor,
    provider: &dyn ServiceProvider,
) -> Result<Services, FactoryError> {
    let mut services = Services::new();
    for param in operation.injected_params() {
        services.insert(param.name.clone(), provider.resolve(&param.ty)?);
    }
    Ok(services)
}

// ---------------------------------------------------------------------------
// LocalPath
// ---------------------------------------------------------------------------

/// In-process execution: authorization gate, before hook, handler with
/// injected parameters resolved, after hook.
pub struct LocalPath {
    type_name: String,
    operation: OperationDescriptor,
    handler: Arc<dyn MethodHandler>,
    gate: AuthorizationGate,
    provider: Arc<dyn ServiceProvider>,
    hooks: Arc<dyn FactoryHooks>,
    save_state: bool,
}

impl LocalPath {
    #[must_use]
    pub(crate) fn new(
        type_name: &str,
        operation: OperationDescriptor,
        handler: Arc<dyn MethodHandler>,
        gate: AuthorizationGate,
        provider: Arc<dyn ServiceProvider>,
        hooks: Arc<dyn FactoryHooks>,
        save_state: bool,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            operation,
            handler,
            gate,
            provider,
            hooks,
            save_state,
        }
    }

    fn receiver(&self, call_target: Option<Entity>) -> Result<Option<Entity>, FactoryError> {
        match self.operation.kind {
            OperationKind::Create | OperationKind::Fetch => {
                Ok(Some(Entity::new(self.type_name.clone())))
            }
            OperationKind::Execute => Ok(None),
            OperationKind::Insert | OperationKind::Update | OperationKind::Delete => call_target
                .map(Some)
                .ok_or_else(|| FactoryError::Arity {
                    method: self.operation.public_name.clone(),
                    expected: 1,
                    actual: 0,
                }),
        }
    }

    fn finish(&self, completion_target: Option<Entity>, value: Value) -> Option<Output> {
        if self.operation.shape.is_success() && value.as_bool() == Some(false) {
            return None;
        }
        if self.operation.kind == OperationKind::Execute {
            return Some(Output::Value(value));
        }
        let Some(mut target) = completion_target else {
            return Some(Output::Value(value));
        };
        if self.save_state {
            match self.operation.kind {
                OperationKind::Fetch | OperationKind::Insert | OperationKind::Update => {
                    target.mark_old();
                }
                OperationKind::Delete => target.mark_new(),
                OperationKind::Create | OperationKind::Execute => {}
            }
        }
        Some(Output::Instance(target))
    }
}

#[async_trait]
impl OperationPath for LocalPath {
    async fn run(&self, call: PathCall) -> Result<Reply, FactoryError> {
        let services = resolve_services(&self.operation, self.provider.as_ref())?;

        let verdict = self
            .gate
            .evaluate(call.target.as_ref(), &call.args, &services)
            .await?;
        if !verdict.allowed {
            return Ok(Reply::Denied(verdict));
        }

        let target = self.receiver(call.target)?;
        self.hooks.before(&self.operation, target.as_ref()).await?;

        let completion = self
            .handler
            .invoke(Invocation {
                target,
                args: call.args,
                services,
            })
            .await?;
        let output = self.finish(completion.target, completion.value);

        self.hooks.after(&self.operation, output.as_ref()).await?;
        tracing::debug!(
            operation = %self.operation.handler_key(),
            found = output.is_some(),
            "local operation complete"
        );
        Ok(Reply::Completed(output))
    }
}

// ---------------------------------------------------------------------------
// ProbePath
// ---------------------------------------------------------------------------

/// Evaluates the kept checks of an operation without running its body.
pub struct ProbePath {
    operation: OperationDescriptor,
    gate: AuthorizationGate,
    provider: Arc<dyn ServiceProvider>,
}

impl ProbePath {
    #[must_use]
    pub(crate) fn new(
        operation: OperationDescriptor,
        gate: AuthorizationGate,
        provider: Arc<dyn ServiceProvider>,
    ) -> Self {
        Self {
            operation,
            gate,
            provider,
        }
    }
}

#[async_trait]
impl OperationPath for ProbePath {
    async fn run(&self, call: PathCall) -> Result<Reply, FactoryError> {
        let services = resolve_services(&self.operation, self.provider.as_ref())?;
        let verdict = self.gate.evaluate(None, &call.args, &services).await?;
        Ok(Reply::Probed(verdict))
    }
}

// ---------------------------------------------------------------------------
// RemotePath
// ---------------------------------------------------------------------------

/// Sends the call through a [`RemoteDispatcher`]. Only the target and the
/// caller-supplied values cross; injected parameters are resolved on the
/// receiving side.
pub struct RemotePath {
    id: OperationId,
    dispatcher: Arc<dyn RemoteDispatcher>,
    next_call_id: AtomicU64,
}

impl RemotePath {
    #[must_use]
    pub(crate) fn new(id: OperationId, dispatcher: Arc<dyn RemoteDispatcher>) -> Self {
        Self {
            id,
            dispatcher,
            next_call_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl OperationPath for RemotePath {
    async fn run(&self, call: PathCall) -> Result<Reply, FactoryError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let request = RemoteRequest {
            call_id,
            operation: self.id.clone(),
            target: call.target,
            args: call.args,
        };
        let response = self
            .dispatcher
            .dispatch(request)
            .await
            .map_err(FactoryError::from_dispatch)?;
        Ok(response.reply)
    }
}

#[cfg(test)]
mod tests {
    use opfactory_core::{ParameterDescriptor, ParameterRole, ReturnShape};

    use super::*;
    use crate::handlers::{Completion, NoHooks};
    use crate::services::ServiceRegistry;

    fn operation(kind: OperationKind, shape: ReturnShape) -> OperationDescriptor {
        let mut params = Vec::new();
        if kind.is_write() {
            params.push(ParameterDescriptor::new("target", "Person", ParameterRole::SelfReference));
        }
        OperationDescriptor {
            kind,
            declaring_type: "Person".to_string(),
            method: kind.as_str().to_string(),
            handler: format!("Person::{kind}"),
            public_name: kind.as_str().to_string(),
            shape,
            remote: false,
            params,
            index: 0,
        }
    }

    fn open_gate(op: &OperationDescriptor) -> AuthorizationGate {
        AuthorizationGate::build(op, &[], &[], &std::collections::HashMap::new()).unwrap()
    }

    fn local(kind: OperationKind, shape: ReturnShape, handler: Arc<dyn MethodHandler>) -> LocalPath {
        let op = operation(kind, shape);
        let gate = open_gate(&op);
        LocalPath::new(
            "Person",
            op,
            handler,
            gate,
            Arc::new(ServiceRegistry::new()),
            Arc::new(NoHooks),
            true,
        )
    }

    #[tokio::test]
    async fn fetch_marks_instance_old() {
        let path = local(
            OperationKind::Fetch,
            ReturnShape::Success,
            Arc::new(|inv: Invocation| async move {
                Ok::<_, anyhow::Error>(Completion::success(inv.target, true))
            }),
        );
        let reply = path.run(PathCall::default()).await.unwrap();
        let Reply::Completed(Some(Output::Instance(entity))) = reply else {
            panic!("expected instance, got {reply:?}");
        };
        assert!(!entity.state.is_new);
    }

    #[tokio::test]
    async fn false_success_reads_as_not_found() {
        let path = local(
            OperationKind::Fetch,
            ReturnShape::Success,
            Arc::new(|inv: Invocation| async move {
                Ok::<_, anyhow::Error>(Completion::success(inv.target, false))
            }),
        );
        assert_eq!(path.run(PathCall::default()).await.unwrap(), Reply::Completed(None));
    }

    #[tokio::test]
    async fn false_success_execute_reads_as_not_found() {
        let path = local(
            OperationKind::Execute,
            ReturnShape::Success,
            Arc::new(|_inv: Invocation| async move {
                Ok::<_, anyhow::Error>(Completion::value(false))
            }),
        );
        assert_eq!(path.run(PathCall::default()).await.unwrap(), Reply::Completed(None));

        let found = local(
            OperationKind::Execute,
            ReturnShape::Success,
            Arc::new(|_inv: Invocation| async move {
                Ok::<_, anyhow::Error>(Completion::value(true))
            }),
        );
        assert_eq!(
            found.run(PathCall::default()).await.unwrap(),
            Reply::Completed(Some(Output::Value(Value::Bool(true))))
        );
    }

    #[tokio::test]
    async fn write_without_target_is_an_arity_error() {
        let path = local(
            OperationKind::Update,
            ReturnShape::Value,
            Arc::new(|inv: Invocation| async move {
                Ok::<_, anyhow::Error>(Completion::done(inv.target))
            }),
        );
        let err = path.run(PathCall::default()).await.unwrap_err();
        assert!(matches!(err, FactoryError::Arity { .. }));
    }

    #[tokio::test]
    async fn handler_errors_pass_through() {
        let path = local(
            OperationKind::Create,
            ReturnShape::Value,
            Arc::new(|_inv: Invocation| async move {
                Err::<Completion, _>(anyhow::anyhow!("disk full"))
            }),
        );
        let err = path.run(PathCall::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }
}
