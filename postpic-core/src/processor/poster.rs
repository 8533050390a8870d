use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::toolchain::{Toolchain, ToolchainResult};
use crate::workspace::Asset;

/// Still frames for renditions and for the asset cover.
#[derive(Clone)]
pub struct PosterGenerator {
    toolchain: Arc<dyn Toolchain>,
    timestamp: String,
}

impl PosterGenerator {
    pub fn new(toolchain: Arc<dyn Toolchain>, timestamp: impl Into<String>) -> Self {
        Self {
            toolchain,
            timestamp: timestamp.into(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub async fn tier_poster(&self, rendition: &Path, poster: &Path) -> ToolchainResult<()> {
        self.toolchain
            .extract_frame(rendition, poster, &self.timestamp)
            .await
    }

    /// Extracts the cover frame from the original into `{work_dir}/{id}.jpg`.
    pub async fn default_poster(&self, asset: &Asset, source: &Path) -> ToolchainResult<PathBuf> {
        let poster = asset.default_poster_path();
        self.toolchain
            .extract_frame(source, &poster, &self.timestamp)
            .await?;
        Ok(poster)
    }
}
