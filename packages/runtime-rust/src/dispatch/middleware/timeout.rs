//! Timeout middleware for dispatched calls.
//!
//! Fails calls running longer than `dispatch_timeout_ms` with
//! `FactoryError::Timeout`.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::dispatch::table::DispatchFuture;
use crate::dispatch::{RemoteRequest, RemoteResponse};
use crate::error::FactoryError;

/// Tower layer that bounds every dispatch by the same timeout.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout_ms: u64,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout_ms: u64,
}

impl<S> Service<RemoteRequest> for TimeoutService<S>
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
        let timeout_ms = self.timeout_ms;
        let fut = self.inner.call(request);
        Box::pin(async move {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(FactoryError::Timeout { timeout_ms }),
            }
        })
    }
}
