use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::ladder::Tier;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    pub paths: PathsSection,
    pub toolchain: ToolchainSection,
    pub limits: LimitsSection,
    pub posters: PostersSection,
    pub subtitles: SubtitlesSection,
    #[serde(default)]
    pub ladder: LadderSection,
}

impl PipelineConfig {
    pub fn root_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.root_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub root_dir: String,
    pub public_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainSection {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub video_codec: String,
    pub preset: String,
    pub audio_codec: String,
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            video_codec: "libx264".into(),
            preset: "veryfast".into(),
            audio_codec: "aac".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    pub max_concurrent_transcodes: u32,
    pub tier_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostersSection {
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitlesSection {
    pub enabled: bool,
    pub language: String,
    pub placeholder_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LadderSection {
    #[serde(default)]
    pub require_rendition: bool,
    /// Replaces the standard table when present; best quality first.
    #[serde(default)]
    pub tiers: Option<Vec<Tier>>,
}

pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
