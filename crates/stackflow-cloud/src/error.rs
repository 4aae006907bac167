//! Error types for provisioning and state management

use stackflow_core::ProjectionError;
use thiserror::Error;

/// Why a node failed (or did not run) during evaluation
///
/// Recorded on the node itself; never aborts independent branches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("input '{input}' could not be projected: {error}")]
    Projection {
        input: String,
        error: ProjectionError,
    },

    #[error("node '{node}' did not report output '{output}'")]
    MissingOutput { node: String, output: String },

    #[error("dependency '{0}' failed")]
    DependencyFailed(String),

    #[error("node '{0}' has not been resolved")]
    NotResolved(String),

    #[error("cancelled")]
    Cancelled,
}

impl ProvisionError {
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning(message.into())
    }
}

/// State file and orchestration errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
