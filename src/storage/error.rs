//! Errors raised by backend adapters and plan evaluation

/// Opaque backend failure, propagated unmodified to the caller
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("No store registered under the name '{0}'")]
    UnknownStore(String),
    #[error("Collection '{0}' does not exist")]
    UnknownCollection(String),
    #[error("'{op}' expects a sequence but found {found}")]
    NotASequence { op: &'static str, found: String },
    #[error("Variable '{0}' is not bound by an enclosing let")]
    UnboundVariable(String),
    #[error("Plan node not supported by {backend}: {node}")]
    Unsupported { backend: String, node: String },
    #[error("Failed to acquire {0} lock")]
    LockPoisoned(&'static str),
    #[error("{backend} failed: {message}")]
    Backend { backend: String, message: String },
}
