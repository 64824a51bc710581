//! Tracing middleware for dispatched calls.
//!
//! Records call duration and outcome on a `dispatch` span and logs one line
//! per completed call.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::dispatch::table::DispatchFuture;
use crate::dispatch::{RemoteRequest, RemoteResponse};
use crate::error::FactoryError;

// ---------------------------------------------------------------------------
// TraceLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatches with timing and outcome.
#[derive(Debug, Clone, Default)]
pub struct TraceLayer {
    node_id: String,
}

impl TraceLayer {
    #[must_use]
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService {
            inner,
            node_id: self.node_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TraceService
// ---------------------------------------------------------------------------

/// Service wrapper that records dispatch duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct TraceService<S> {
    inner: S,
    node_id: String,
}

impl<S> Service<RemoteRequest> for TraceService<S>
where
    S: Service<RemoteRequest, Response = RemoteResponse, Error = FactoryError> + Send,
    S::Future: Send + 'static,
{
    type Response = RemoteResponse;
    type Error = FactoryError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: RemoteRequest) -> Self::Future {
        let operation = request.operation.to_string();
        let call_id = request.call_id;

        let span = info_span!(
            "dispatch",
            node = %self.node_id,
            operation = %operation,
            call_id = call_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(FactoryError::Operation(_)) => "failed",
                    Err(_) => "rejected",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::info!(
                    operation = %operation,
                    call_id = call_id,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "dispatch complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opfactory_core::OperationId;
    use tower::ServiceExt;

    use super::*;
    use crate::path::Reply;

    /// Immediately-completing service.
    struct ImmediateService;

    impl Service<RemoteRequest> for ImmediateService {
        type Response = RemoteResponse;
        type Error = FactoryError;
        type Future = DispatchFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: RemoteRequest) -> Self::Future {
            let call_id = request.call_id;
            Box::pin(async move {
                Ok(RemoteResponse {
                    call_id,
                    reply: Reply::Completed(None),
                })
            })
        }
    }

    #[tokio::test]
    async fn trace_layer_passes_through_response() {
        let svc = TraceLayer::new("node-1").layer(ImmediateService);
        let request = RemoteRequest {
            call_id: 42,
            operation: OperationId::from("Person::fetch"),
            target: None,
            args: vec![],
        };
        let resp = svc.oneshot(request).await.unwrap();
        assert_eq!(resp.call_id, 42);
        assert_eq!(resp.reply, Reply::Completed(None));
    }
}
