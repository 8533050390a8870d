use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("command failed ({command}) with status {status:?}: {stderr}")]
    CommandFailure {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("unexpected probe output for {path}: {output:?}")]
    InvalidProbeOutput { path: PathBuf, output: String },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

pub type ToolchainResult<T> = Result<T, ToolchainError>;
