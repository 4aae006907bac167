//! Exec provisioner error types

use stackflow_cloud::ProvisionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Exited {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' printed invalid outputs: {source}")]
    InvalidOutput {
        command: String,
        source: serde_json::Error,
    },

    #[error("failed to read {stream} of '{command}': {source}")]
    Pipe {
        command: String,
        stream: &'static str,
        source: std::io::Error,
    },

    #[error("'{command}' printed non UTF-8 output: {source}")]
    InvalidUtf8 {
        command: String,
        source: std::string::FromUtf8Error,
    },

    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("'{command}' was cancelled")]
    Cancelled { command: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecError> for ProvisionError {
    fn from(error: ExecError) -> Self {
        match error {
            ExecError::Cancelled { .. } => ProvisionError::Cancelled,
            other => ProvisionError::Provisioning(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
