//! Pipeline composition: wraps a dispatch table in every middleware layer.

use tower::ServiceBuilder;

use super::timeout::{TimeoutLayer, TimeoutService};
use super::trace::{TraceLayer, TraceService};
use crate::config::RuntimeConfig;
use crate::dispatch::table::DispatchTable;

/// The composed receiving-side service.
pub type DispatchPipeline = TimeoutService<TraceService<DispatchTable>>;

/// Build the dispatch pipeline around `table`.
///
/// Layer order (outermost to innermost):
/// 1. `TimeoutLayer` -- bound each call
/// 2. `TraceLayer` -- record timing and outcome
#[must_use]
pub fn build_dispatch_pipeline(table: DispatchTable, config: &RuntimeConfig) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(TimeoutLayer::new(config.dispatch_timeout_ms))
        .layer(TraceLayer::new(config.node_id.clone()))
        .service(table)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use opfactory_core::OperationId;
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::RemoteRequest;
    use crate::error::FactoryError;
    use crate::handlers::Authorized;
    use crate::path::{OperationPath, PathCall, Reply};

    struct AllowPath;

    #[async_trait]
    impl OperationPath for AllowPath {
        async fn run(&self, _call: PathCall) -> Result<Reply, FactoryError> {
            Ok(Reply::Probed(Authorized::allow()))
        }
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let mut table = DispatchTable::new();
        table.insert(OperationId::from("Person::can_fetch"), Arc::new(AllowPath));

        let config = RuntimeConfig {
            dispatch_timeout_ms: 1_000,
            ..RuntimeConfig::default()
        };

        let svc = build_dispatch_pipeline(table, &config);
        let resp = svc
            .oneshot(RemoteRequest {
                call_id: 42,
                operation: OperationId::from("Person::can_fetch"),
                target: None,
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(resp.call_id, 42);
        assert_eq!(resp.reply, Reply::Probed(Authorized::allow()));
    }
}
