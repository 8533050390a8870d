use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use postpic_core::{
    load_pipeline_config, plan_ladder, FfmpegToolchain, Manifest, Pipeline, PipelineConfig,
    PipelineSettings, SubtitleJobs, Tier, Toolchain, ToolchainError,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] postpic_core::ConfigError),
    #[error("{0}")]
    Pipeline(#[from] postpic_core::PipelineError),
    #[error("toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "postpic video ingestion control interface", long_about = None)]
pub struct Cli {
    /// Path to pipeline.toml
    #[arg(long, default_value = "configs/pipeline.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingests a video file and prints its manifest
    Ingest(IngestArgs),
    /// Prints the rendition ladder for a frame size
    Ladder(LadderArgs),
    /// Prints the frame size of a video file
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    pub file: PathBuf,
    /// Use this asset id instead of a generated one
    #[arg(long)]
    pub asset_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct LadderArgs {
    #[arg(long)]
    pub width: u32,
    #[arg(long)]
    pub height: u32,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    pub file: PathBuf,
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_pipeline_config(&cli.config)?;
    let settings = PipelineSettings::try_from(&config)?;

    match &cli.command {
        Commands::Ladder(args) => {
            let report = LadderReport::plan(args.width, args.height, &settings.tiers);
            render(&report, cli.format)?;
        }
        Commands::Probe(args) => {
            let runtime = runtime()?;
            let report = runtime.block_on(probe(&config, &settings, &args.file))?;
            render(&report, cli.format)?;
        }
        Commands::Ingest(args) => {
            let runtime = runtime()?;
            let report = runtime.block_on(ingest(&config, settings, args))?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

async fn probe(
    config: &PipelineConfig,
    settings: &PipelineSettings,
    file: &Path,
) -> Result<ProbeReport> {
    let toolchain = FfmpegToolchain::new(&config.toolchain, None);
    let (width, height) = tokio::time::timeout(settings.probe_timeout, toolchain.probe(file))
        .await
        .unwrap_or(Err(ToolchainError::Timeout {
            operation: "probe",
            timeout: settings.probe_timeout,
        }))?;
    Ok(ProbeReport {
        file: file.to_path_buf(),
        width,
        height,
    })
}

async fn ingest(
    config: &PipelineConfig,
    settings: PipelineSettings,
    args: &IngestArgs,
) -> Result<IngestReport> {
    let toolchain: Arc<dyn Toolchain> = Arc::new(FfmpegToolchain::new(&config.toolchain, None));
    let (jobs, mut failures) = SubtitleJobs::new();
    let subtitles = Arc::new(jobs);
    let pipeline = Pipeline::new(settings, toolchain, Arc::clone(&subtitles));

    let mut upload = tokio::fs::File::open(&args.file).await?;
    info!(file = %args.file.display(), "ingesting upload");
    let outcome = match &args.asset_id {
        Some(asset_id) => pipeline.ingest_with_id(asset_id, &mut upload).await,
        None => pipeline.ingest(&mut upload).await,
    };
    subtitles.shutdown().await;
    let manifest = outcome?;

    let mut subtitle_failures = Vec::new();
    while let Ok(failure) = failures.try_recv() {
        warn!(asset_id = %failure.asset_id, error = %failure.message, "subtitle stub missing");
        subtitle_failures.push(failure.message);
    }
    Ok(IngestReport {
        manifest,
        subtitle_failures,
    })
}

#[derive(Debug, Serialize)]
pub struct LadderReport {
    pub source_width: u32,
    pub source_height: u32,
    pub tiers: Vec<LadderRow>,
}

#[derive(Debug, Serialize)]
pub struct LadderRow {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

impl LadderReport {
    pub fn plan(source_width: u32, source_height: u32, tiers: &[Tier]) -> Self {
        let tiers = plan_ladder(source_width, source_height, tiers)
            .into_iter()
            .map(|planned| LadderRow {
                label: planned.tier.label,
                width: planned.fitted_width,
                height: planned.fitted_height,
            })
            .collect();
        Self {
            source_width,
            source_height,
            tiers,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub file: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub manifest: Manifest,
    pub subtitle_failures: Vec<String>,
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for LadderReport {
    fn display(&self) -> String {
        if self.tiers.is_empty() {
            return format!("No tiers fit {}x{}", self.source_width, self.source_height);
        }
        let mut lines = vec![format!(
            "Ladder for {}x{}:",
            self.source_width, self.source_height
        )];
        for row in &self.tiers {
            lines.push(format!("  - {}: {}x{}", row.label, row.width, row.height));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for ProbeReport {
    fn display(&self) -> String {
        format!("{}: {}x{}", self.file.display(), self.width, self.height)
    }
}

impl DisplayFallback for IngestReport {
    fn display(&self) -> String {
        let manifest = &self.manifest;
        let mut lines = vec![format!("Asset: {}", manifest.asset_id)];
        if manifest.renditions.is_empty() {
            lines.push("Renditions: none".to_string());
        } else {
            lines.push("Renditions:".to_string());
            for entry in &manifest.renditions {
                lines.push(format!("  - {}: {}", entry.label, entry.url));
            }
        }
        lines.push(format!("Poster: {}", manifest.default_poster_url));
        let subtitles = manifest.subtitle_url.as_deref().unwrap_or("-");
        lines.push(format!("Subtitles: {subtitles}"));
        for failure in &self.subtitle_failures {
            lines.push(format!("  ! {failure}"));
        }
        lines.join("\n")
    }
}
