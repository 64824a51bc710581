use opfactory_core::SaveBranch;

/// Errors raised by a running factory.
///
/// Everything a handler, check, service provider or dispatcher raises is
/// carried unmodified in [`FactoryError::Operation`]; the other variants
/// are detected by the factory itself.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("{operation} is not authorized{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    NotAuthorized {
        operation: String,
        message: Option<String>,
    },
    #[error("{operation} has no {} operation to route to", branch.as_str())]
    NotImplemented { operation: String, branch: SaveBranch },
    #[error("factory for {type_name} has no method {method}")]
    UnknownMethod { type_name: String, method: String },
    #[error("{method} is a {actual} method, not a {expected} method")]
    WrongKind {
        method: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{method} takes {expected} arguments, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("no handler registered for {key}")]
    MissingHandler { key: String },
    #[error("no authorization check registered for {key}")]
    MissingCheck { key: String },
    #[error("{type_name} has cross-process operations but no remote dispatcher")]
    NoDispatcher { type_name: String },
    #[error("unknown operation: {id}")]
    UnknownOperation { id: String },
    #[error("{method} received a reply of the wrong shape")]
    ShapeMismatch { method: String },
    #[error("dispatch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}

impl FactoryError {
    /// Recovers a factory error that crossed a dispatcher as `anyhow::Error`.
    #[must_use]
    pub fn from_dispatch(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(factory) => factory,
            Err(other) => Self::Operation(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_authorized_includes_message() {
        let err = FactoryError::NotAuthorized {
            operation: "update".to_string(),
            message: Some("read only".to_string()),
        };
        assert_eq!(err.to_string(), "update is not authorized: read only");
        let bare = FactoryError::NotAuthorized {
            operation: "update".to_string(),
            message: None,
        };
        assert_eq!(bare.to_string(), "update is not authorized");
    }

    #[test]
    fn from_dispatch_unwraps_factory_errors() {
        let crossed = anyhow::Error::from(FactoryError::Timeout { timeout_ms: 50 });
        assert!(matches!(
            FactoryError::from_dispatch(crossed),
            FactoryError::Timeout { timeout_ms: 50 }
        ));
        let foreign = anyhow::anyhow!("connection reset");
        let err = FactoryError::from_dispatch(foreign);
        assert_eq!(err.to_string(), "connection reset");
    }
}
