mod error;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolchainSection;
use crate::ladder::Geometry;

pub use error::{ToolchainError, ToolchainResult};

/// Media capabilities the pipeline needs from the outside world.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Returns `(width, height)` of the first video stream.
    async fn probe(&self, input: &Path) -> ToolchainResult<(u32, u32)>;

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        geometry: Geometry,
    ) -> ToolchainResult<()>;

    /// Writes a single JPEG frame taken at `timestamp` (`HH:MM:SS`).
    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        timestamp: &str,
    ) -> ToolchainResult<()>;
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        command.output().await
    }
}

/// [`Toolchain`] backed by the `ffmpeg` and `ffprobe` binaries.
pub struct FfmpegToolchain {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    video_codec: String,
    preset: String,
    audio_codec: String,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for FfmpegToolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegToolchain")
            .field("ffmpeg", &self.ffmpeg)
            .field("ffprobe", &self.ffprobe)
            .field("video_codec", &self.video_codec)
            .field("preset", &self.preset)
            .field("audio_codec", &self.audio_codec)
            .finish()
    }
}

impl FfmpegToolchain {
    pub fn new(section: &ToolchainSection, executor: Option<Arc<dyn CommandExecutor>>) -> Self {
        let executor = executor.unwrap_or_else(|| Arc::new(SystemCommandExecutor));
        Self {
            ffmpeg: PathBuf::from(&section.ffmpeg),
            ffprobe: PathBuf::from(&section.ffprobe),
            video_codec: section.video_codec.clone(),
            preset: section.preset.clone(),
            audio_codec: section.audio_codec.clone(),
            executor,
        }
    }

    fn ffmpeg_command(&self) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .kill_on_drop(true)
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error");
        command
    }

    async fn execute(&self, mut command: Command) -> ToolchainResult<Output> {
        let rendered = render_command(&command);
        let program = command.as_std().get_program().to_string_lossy().to_string();
        debug!(command = %rendered, "running toolchain command");
        let output = self
            .executor
            .run(&mut command)
            .await
            .map_err(|source| ToolchainError::Spawn { program, source })?;
        if !output.status.success() {
            return Err(ToolchainError::CommandFailure {
                command: rendered,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl Toolchain for FfmpegToolchain {
    async fn probe(&self, input: &Path) -> ToolchainResult<(u32, u32)> {
        let mut command = Command::new(&self.ffprobe);
        command
            .kill_on_drop(true)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height")
            .arg("-of")
            .arg("csv=s=,:p=0")
            .arg(input);
        let output = self.execute(command).await?;
        parse_probe_output(input, &String::from_utf8_lossy(&output.stdout))
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        geometry: Geometry,
    ) -> ToolchainResult<()> {
        let mut command = self.ffmpeg_command();
        command
            .arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(scale_filter(geometry))
            .arg("-c:v")
            .arg(&self.video_codec)
            .arg("-preset")
            .arg(&self.preset)
            .arg("-c:a")
            .arg(&self.audio_codec)
            .arg("-movflags")
            .arg("+faststart")
            .arg(output);
        self.execute(command).await.map(|_| ())
    }

    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        timestamp: &str,
    ) -> ToolchainResult<()> {
        let mut command = self.ffmpeg_command();
        command
            .arg("-ss")
            .arg(timestamp)
            .arg("-i")
            .arg(input)
            .arg("-frames:v")
            .arg("1")
            .arg("-q:v")
            .arg("2")
            .arg(output);
        self.execute(command).await.map(|_| ())
    }
}

/// Parses ffprobe's `width,height` csv line.
pub fn parse_probe_output(path: &Path, stdout: &str) -> ToolchainResult<(u32, u32)> {
    let invalid = || ToolchainError::InvalidProbeOutput {
        path: path.to_path_buf(),
        output: stdout.to_string(),
    };
    let line = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(invalid)?;
    let captures = probe_line_regex().captures(line).ok_or_else(invalid)?;
    let width: u32 = captures[1].parse().map_err(|_| invalid())?;
    let height: u32 = captures[2].parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn probe_line_regex() -> &'static Regex {
    static PROBE_LINE: OnceLock<Regex> = OnceLock::new();
    PROBE_LINE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*,\s*(\d+)").expect("valid regex"))
}

/// Scales to `geometry`, then trims to even dimensions as 4:2:0 encoders
/// require (853x480 becomes 852x480).
pub fn scale_filter(geometry: Geometry) -> String {
    format!(
        "scale={}:{},scale=trunc(iw/2)*2:trunc(ih/2)*2",
        geometry.width, geometry.height
    )
}

fn render_command(command: &Command) -> String {
    let std = command.as_std();
    let mut parts = vec![std.get_program().to_string_lossy().to_string()];
    parts.extend(std.get_args().map(|arg| arg.to_string_lossy().to_string()));
    parts.join(" ")
}
