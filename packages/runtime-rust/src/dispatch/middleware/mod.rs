//! Tower middleware layers for the receiving-side dispatch pipeline.
//!
//! - [`timeout`]: per-dispatch timeout enforcement
//! - [`trace`]: dispatch timing and outcome via `tracing` spans
//! - [`pipeline`]: composes all layers into a single service stack

pub mod pipeline;
pub mod timeout;
pub mod trace;

pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
pub use timeout::TimeoutLayer;
pub use trace::TraceLayer;
