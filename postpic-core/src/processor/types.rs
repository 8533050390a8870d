use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::ladder::{default_tiers, Tier};
use crate::workspace::Asset;

pub const DEFAULT_POSTER_TIMESTAMP: &str = "00:00:01";
pub const DEFAULT_PUBLIC_PREFIX: &str = "/postpic";

/// The stored upload together with its probed frame size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVideo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A tier whose video and poster were both produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub tier_label: String,
    pub rank: usize,
    pub width: u32,
    /// Nominal height of the tier, e.g. 720 for `720p`.
    pub height: u32,
    pub output_path: PathBuf,
    pub poster_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenditionEntry {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
    pub poster_url: String,
}

/// What the caller gets back for a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub asset_id: String,
    /// Best quality first.
    pub available_heights: Vec<u32>,
    /// One URL per entry of `available_heights`, same order.
    pub rendition_urls: Vec<String>,
    pub renditions: Vec<RenditionEntry>,
    pub primary_rendition_url: Option<String>,
    pub default_poster_url: String,
    /// May point at a file that is still being written.
    pub subtitle_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    pub fn assemble(
        asset: &Asset,
        renditions: &[Rendition],
        public_prefix: &str,
        subtitle_language: Option<&str>,
    ) -> Self {
        let mut ordered: Vec<&Rendition> = renditions.iter().collect();
        ordered.sort_by_key(|rendition| rendition.rank);

        let url = |path: &Path| public_url(public_prefix, &asset.id, path);
        let entries: Vec<RenditionEntry> = ordered
            .iter()
            .map(|rendition| RenditionEntry {
                label: rendition.tier_label.clone(),
                width: rendition.width,
                height: rendition.height,
                url: url(rendition.output_path.as_path()),
                poster_url: url(rendition.poster_path.as_path()),
            })
            .collect();

        Self {
            asset_id: asset.id.clone(),
            available_heights: entries.iter().map(|entry| entry.height).collect(),
            rendition_urls: entries.iter().map(|entry| entry.url.clone()).collect(),
            primary_rendition_url: entries.first().map(|entry| entry.url.clone()),
            renditions: entries,
            default_poster_url: url(asset.default_poster_path().as_path()),
            subtitle_url: subtitle_language.map(|lang| url(asset.subtitle_path(lang).as_path())),
            created_at: Utc::now(),
        }
    }
}

fn public_url(prefix: &str, asset_id: &str, path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{}/{}/{}", prefix.trim_end_matches('/'), asset_id, file_name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleSettings {
    pub language: String,
    pub placeholder_text: String,
}

/// Everything the orchestrator needs to know, fixed for its lifetime.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub root_dir: PathBuf,
    pub public_prefix: String,
    pub tiers: Vec<Tier>,
    pub poster_timestamp: String,
    pub subtitles: Option<SubtitleSettings>,
    /// Upper bound on tier jobs running at once, across all uploads.
    pub max_concurrent_transcodes: usize,
    pub tier_timeout: Duration,
    pub probe_timeout: Duration,
    /// Treat an upload where every tier failed as an error.
    pub require_rendition: bool,
}

impl PipelineSettings {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            tiers: default_tiers(),
            poster_timestamp: DEFAULT_POSTER_TIMESTAMP.to_string(),
            subtitles: Some(SubtitleSettings {
                language: "en".to_string(),
                placeholder_text: "Subtitles are not available yet.".to_string(),
            }),
            max_concurrent_transcodes: 2,
            tier_timeout: Duration::from_secs(900),
            probe_timeout: Duration::from_secs(30),
            require_rendition: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_transcodes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_transcodes must be greater than zero".into(),
            ));
        }
        if self.tier_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".into()));
        }
        if self.poster_timestamp.trim().is_empty() {
            return Err(ConfigError::Invalid("poster timestamp is empty".into()));
        }
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid("ladder has no tiers".into()));
        }
        let mut labels = HashSet::new();
        for tier in &self.tiers {
            if !is_file_token(&tier.label) || tier.max_width == 0 || tier.max_height == 0 {
                return Err(ConfigError::Invalid(format!("invalid tier {:?}", tier.label)));
            }
            if !labels.insert(tier.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "tier {:?} is listed more than once",
                    tier.label
                )));
            }
        }
        for pair in self.tiers.windows(2) {
            if pair[1].max_width > pair[0].max_width || pair[1].max_height > pair[0].max_height {
                return Err(ConfigError::Invalid(format!(
                    "tier {} must not be larger than {}",
                    pair[1].label, pair[0].label
                )));
            }
        }
        if let Some(subtitles) = &self.subtitles {
            if !is_file_token(&subtitles.language) {
                return Err(ConfigError::Invalid(format!(
                    "invalid subtitle language {:?}",
                    subtitles.language
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<&PipelineConfig> for PipelineSettings {
    type Error = ConfigError;

    fn try_from(config: &PipelineConfig) -> Result<Self, Self::Error> {
        let subtitles = config.subtitles.enabled.then(|| SubtitleSettings {
            language: config.subtitles.language.clone(),
            placeholder_text: config.subtitles.placeholder_text.clone(),
        });
        let settings = Self {
            root_dir: config.root_dir(),
            public_prefix: config.paths.public_prefix.clone(),
            tiers: config.ladder.tiers.clone().unwrap_or_else(default_tiers),
            poster_timestamp: config.posters.timestamp.clone(),
            subtitles,
            max_concurrent_transcodes: config.limits.max_concurrent_transcodes as usize,
            tier_timeout: Duration::from_secs(config.limits.tier_timeout_seconds),
            probe_timeout: Duration::from_secs(config.limits.probe_timeout_seconds),
            require_rendition: config.ladder.require_rendition,
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn is_file_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
