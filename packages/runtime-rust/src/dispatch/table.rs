//! Receiving-side dispatch: routes `RemoteRequest` to local paths by
//! operation identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use opfactory_core::OperationId;
use tower::Service;

use super::{RemoteRequest, RemoteResponse};
use crate::error::FactoryError;
use crate::path::{OperationPath, PathCall};

pub(crate) type DispatchFuture = BoxFuture<'static, Result<RemoteResponse, FactoryError>>;

// ---------------------------------------------------------------------------
// DispatchTable
// ---------------------------------------------------------------------------

/// Maps operation identity to the local callable that serves it.
///
/// Each factory contributes its cross-process operations and probes through
/// `Factory::dispatch_table`; tables of several factories merge into one.
/// Requests for an unregistered identity fail with
/// `FactoryError::UnknownOperation`.
#[derive(Clone, Default)]
pub struct DispatchTable {
    entries: Arc<HashMap<OperationId, Arc<dyn OperationPath>>>,
}

impl DispatchTable {
    /// Create a new empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the local path serving `id`, replacing any previous one.
    pub fn insert(&mut self, id: OperationId, path: Arc<dyn OperationPath>) {
        Arc::make_mut(&mut self.entries).insert(id, path);
    }

    /// Adds every entry of `other`.
    pub fn merge(&mut self, other: &DispatchTable) {
        let entries = Arc::make_mut(&mut self.entries);
        for (id, path) in other.entries.iter() {
            entries.insert(id.clone(), path.clone());
        }
    }

    #[must_use]
    pub fn contains(&self, id: &OperationId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identities, sorted.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Service<RemoteRequest> for DispatchTable {
    type Response = RemoteResponse;
    type Error = FactoryError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RemoteRequest) -> Self::Future {
        let Some(path) = self.entries.get(&request.operation).cloned() else {
            let id = request.operation.to_string();
            return Box::pin(async move { Err(FactoryError::UnknownOperation { id }) });
        };
        Box::pin(async move {
            let call_id = request.call_id;
            let reply = path
                .run(PathCall {
                    target: request.target,
                    args: request.args,
                })
                .await?;
            Ok(RemoteResponse { call_id, reply })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tower::ServiceExt;

    use super::*;
    use crate::handlers::Authorized;
    use crate::path::Reply;

    /// A path that answers every call with a fixed probe result.
    struct FixedPath(bool);

    #[async_trait]
    impl OperationPath for FixedPath {
        async fn run(&self, _call: PathCall) -> Result<Reply, FactoryError> {
            Ok(Reply::Probed(Authorized::from(self.0)))
        }
    }

    fn request(id: &str) -> RemoteRequest {
        RemoteRequest {
            call_id: 9,
            operation: OperationId::from(id),
            target: None,
            args: vec![],
        }
    }

    #[tokio::test]
    async fn routes_by_operation_id() {
        let mut table = DispatchTable::new();
        table.insert(OperationId::from("Person::can_fetch"), Arc::new(FixedPath(true)));
        table.insert(OperationId::from("Person::can_create"), Arc::new(FixedPath(false)));

        let resp = table.clone().oneshot(request("Person::can_fetch")).await.unwrap();
        assert_eq!(resp.call_id, 9);
        assert_eq!(resp.reply, Reply::Probed(Authorized::allow()));

        let resp = table.oneshot(request("Person::can_create")).await.unwrap();
        assert_eq!(resp.reply, Reply::Probed(Authorized::from(false)));
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let err = DispatchTable::new()
            .oneshot(request("Person::nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::UnknownOperation { id } if id == "Person::nope"));
    }

    #[test]
    fn merge_combines_tables() {
        let mut a = DispatchTable::new();
        a.insert(OperationId::from("A::x"), Arc::new(FixedPath(true)));
        let mut b = DispatchTable::new();
        b.insert(OperationId::from("B::y"), Arc::new(FixedPath(true)));
        a.merge(&b);
        assert_eq!(
            a.operations(),
            vec![OperationId::from("A::x"), OperationId::from("B::y")]
        );
    }
}
