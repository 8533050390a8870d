pub mod config;
pub mod error;
pub mod ladder;
pub mod processor;
pub mod status;
pub mod subtitle;
pub mod toolchain;
pub mod workspace;

pub use config::{
    load_pipeline_config, LadderSection, LimitsSection, PathsSection, PipelineConfig,
    PostersSection, SubtitlesSection, ToolchainSection,
};
pub use error::{ConfigError, Result};
pub use ladder::{default_tiers, plan_ladder, Geometry, PlannedTier, Tier};
pub use processor::{
    Manifest, Pipeline, PipelineError, PipelineResult, PipelineSettings, PosterGenerator,
    Rendition, RenditionEntry, RenditionTranscoder, SourceVideo, SubtitleSettings, TierError,
    TierLoopReport,
};
pub use status::{PipelineStage, StageEvent, StatusHub, StatusSubscription};
pub use subtitle::{placeholder_track, SubtitleFailure, SubtitleJob, SubtitleJobs};
pub use toolchain::{
    parse_probe_output, scale_filter, CommandExecutor, FfmpegToolchain, SystemCommandExecutor,
    Toolchain, ToolchainError, ToolchainResult,
};
pub use workspace::{
    Asset, AssetIdGenerator, IntakeError, UuidAssetIds, Workspace, WorkspaceError,
};
