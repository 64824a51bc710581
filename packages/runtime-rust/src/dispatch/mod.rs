//! Cross-process dispatch.
//!
//! The calling side hands a [`RemoteRequest`] to a [`RemoteDispatcher`]; the
//! receiving side serves it from a [`table::DispatchTable`] wrapped in the
//! [`middleware`] pipeline. Transport is the host's concern: a dispatcher may
//! serialize the request (both message types are serde-encodable) or, as
//! [`LoopbackDispatcher`] does, hand it straight to an in-process pipeline.

pub mod middleware;
pub mod table;

use async_trait::async_trait;
use opfactory_core::{Entity, OperationId, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower::util::BoxCloneService;
use tower::ServiceExt;

use crate::error::FactoryError;
use crate::path::Reply;

pub use middleware::{build_dispatch_pipeline, DispatchPipeline};
pub use table::DispatchTable;

/// One cross-process call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    /// Correlates the response with the call on the sending side.
    pub call_id: u64,
    pub operation: OperationId,
    /// The write target, when the operation takes one.
    pub target: Option<Entity>,
    /// Caller-supplied values only.
    pub args: Vec<Value>,
}

/// Answer to one [`RemoteRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub call_id: u64,
    pub reply: Reply,
}

/// Carries requests to the process that serves them.
///
/// Errors returned here reach the caller unchanged; a [`FactoryError`]
/// boxed into the `anyhow::Error` is recovered as such.
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    async fn dispatch(&self, request: RemoteRequest) -> anyhow::Result<RemoteResponse>;
}

/// Boxed receiving-side service, as accepted by [`LoopbackDispatcher`].
pub type BoxDispatchService = BoxCloneService<RemoteRequest, RemoteResponse, FactoryError>;

/// Dispatcher that serves requests in the same process, through the same
/// receiving-side pipeline a networked host would use.
pub struct LoopbackDispatcher {
    service: Mutex<BoxDispatchService>,
}

impl LoopbackDispatcher {
    #[must_use]
    pub fn new<S>(service: S) -> Self
    where
        S: tower::Service<RemoteRequest, Response = RemoteResponse, Error = FactoryError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            service: Mutex::new(BoxCloneService::new(service)),
        }
    }
}

#[async_trait]
impl RemoteDispatcher for LoopbackDispatcher {
    async fn dispatch(&self, request: RemoteRequest) -> anyhow::Result<RemoteResponse> {
        let service = self.service.lock().clone();
        tracing::trace!(operation = %request.operation, call_id = request.call_id, "loopback dispatch");
        service.oneshot(request).await.map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::handlers::Authorized;
    use crate::path::{OperationPath, PathCall};

    struct EchoArgs;

    #[async_trait]
    impl OperationPath for EchoArgs {
        async fn run(&self, call: PathCall) -> Result<Reply, FactoryError> {
            Ok(Reply::Probed(Authorized::from(!call.args.is_empty())))
        }
    }

    #[tokio::test]
    async fn loopback_serves_through_the_pipeline() {
        let mut table = DispatchTable::new();
        table.insert(OperationId::from("Person::can_fetch"), Arc::new(EchoArgs));
        let dispatcher =
            LoopbackDispatcher::new(build_dispatch_pipeline(table, &RuntimeConfig::default()));

        let response = dispatcher
            .dispatch(RemoteRequest {
                call_id: 3,
                operation: OperationId::from("Person::can_fetch"),
                target: None,
                args: vec![Value::Int(1)],
            })
            .await
            .unwrap();
        assert_eq!(response.call_id, 3);
        assert_eq!(response.reply, Reply::Probed(Authorized::allow()));
    }

    #[tokio::test]
    async fn loopback_errors_keep_their_variant() {
        let dispatcher = LoopbackDispatcher::new(build_dispatch_pipeline(
            DispatchTable::new(),
            &RuntimeConfig::default(),
        ));
        let err = dispatcher
            .dispatch(RemoteRequest {
                call_id: 1,
                operation: OperationId::from("Person::missing"),
                target: None,
                args: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(
            FactoryError::from_dispatch(err),
            FactoryError::UnknownOperation { .. }
        ));
    }

    #[test]
    fn requests_serialize() {
        let request = RemoteRequest {
            call_id: 5,
            operation: OperationId::from("Person::update"),
            target: Some(Entity::new("Person").with("name", "Ada")),
            args: vec![Value::from("note")],
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: RemoteRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
