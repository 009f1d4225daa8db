//! Error types for the Windup Kubernetes operator.

use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Write rejected because the object changed since it was observed.
    #[error("Conflict writing {kind}/{name}: {message}")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Message returned by the store.
        message: String,
    },

    /// Invalid operator configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The Windup spec failed validation.
    #[error("Spec validation failed: {0}")]
    ValidationError(String),

    /// The dependency graph is malformed (cycle, dangling or duplicate node).
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Reconciliation error.
    #[error("Reconciliation failed for {kind}/{name}: {cause}")]
    ReconcileError {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Error cause.
        cause: String,
    },
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl OperatorError {
    /// Whether the error is expected to clear on a later pass without user action.
    ///
    /// Conflicts, failed writes and API availability problems are transient;
    /// configuration and validation errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            OperatorError::KubeError(_)
            | OperatorError::Conflict { .. }
            | OperatorError::ReconcileError { .. } => true,
            OperatorError::InvalidConfig(_)
            | OperatorError::ValidationError(_)
            | OperatorError::InvalidWorkflow(_) => false,
        }
    }
}
