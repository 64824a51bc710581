/// Runtime configuration for factories and the receiving-side dispatch
/// pipeline.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Identifier of this node, attached to dispatch spans.
    pub node_id: String,
    /// Upper bound on one dispatched call, in milliseconds.
    pub dispatch_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            dispatch_timeout_ms: 30_000,
        }
    }
}
