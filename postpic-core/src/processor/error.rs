use std::time::Duration;

use thiserror::Error;

use crate::toolchain::ToolchainError;
use crate::workspace::{IntakeError, WorkspaceError};

/// Failures that abort a pipeline run. Every variant except `Workspace`
/// leaves no asset directory behind.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("intake failed for asset {asset_id}: {source}")]
    Intake {
        asset_id: String,
        source: IntakeError,
    },
    #[error("probe failed for asset {asset_id}: {source}")]
    Probe {
        asset_id: String,
        source: ToolchainError,
    },
    #[error("default poster failed for asset {asset_id}: {source}")]
    FatalPoster {
        asset_id: String,
        source: ToolchainError,
    },
    #[error("asset {asset_id} produced no renditions")]
    NoRenditions { asset_id: String },
}

impl PipelineError {
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            PipelineError::Workspace(_) => None,
            PipelineError::Intake { asset_id, .. }
            | PipelineError::Probe { asset_id, .. }
            | PipelineError::FatalPoster { asset_id, .. }
            | PipelineError::NoRenditions { asset_id } => Some(asset_id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Workspace(_) => "workspace",
            PipelineError::Intake { .. } => "intake",
            PipelineError::Probe { .. } => "probe",
            PipelineError::FatalPoster { .. } => "default_poster",
            PipelineError::NoRenditions { .. } => "no_renditions",
        }
    }
}

/// Why a single tier was left out of the manifest.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("transcode to {tier} failed: {source}")]
    Transcode {
        tier: String,
        source: ToolchainError,
    },
    #[error("poster for {tier} failed: {source}")]
    Poster {
        tier: String,
        source: ToolchainError,
    },
    #[error("{stage} for {tier} exceeded {timeout:?}")]
    TimedOut {
        tier: String,
        stage: &'static str,
        timeout: Duration,
    },
    #[error("{tier} was cancelled")]
    Cancelled { tier: String },
    #[error("job for {tier} did not finish: {reason}")]
    Aborted { tier: String, reason: String },
}

impl TierError {
    pub fn tier(&self) -> &str {
        match self {
            TierError::Transcode { tier, .. }
            | TierError::Poster { tier, .. }
            | TierError::TimedOut { tier, .. }
            | TierError::Cancelled { tier }
            | TierError::Aborted { tier, .. } => tier,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
