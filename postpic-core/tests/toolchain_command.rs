use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;

use postpic_core::config::ToolchainSection;
use postpic_core::ladder::Geometry;
use postpic_core::toolchain::{CommandExecutor, FfmpegToolchain, Toolchain, ToolchainError};

#[derive(Default)]
struct RecordingExecutor {
    invocations: Mutex<Vec<Vec<String>>>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: i32,
}

impl RecordingExecutor {
    fn succeeding(stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    fn failing(code: i32, stderr: &str) -> Self {
        Self {
            stderr: stderr.as_bytes().to_vec(),
            exit_code: code,
            ..Self::default()
        }
    }

    fn last(&self) -> Vec<String> {
        self.invocations.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, command: &mut Command) -> std::io::Result<Output> {
        let std = command.as_std();
        let mut line = vec![std.get_program().to_string_lossy().to_string()];
        line.extend(std.get_args().map(|arg| arg.to_string_lossy().to_string()));
        self.invocations.lock().unwrap().push(line);
        Ok(Output {
            status: ExitStatus::from_raw(self.exit_code << 8),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        })
    }
}

fn toolchain(executor: Arc<RecordingExecutor>) -> FfmpegToolchain {
    let section = ToolchainSection {
        ffmpeg: "/opt/ffmpeg/bin/ffmpeg".into(),
        ffprobe: "/opt/ffmpeg/bin/ffprobe".into(),
        ..ToolchainSection::default()
    };
    FfmpegToolchain::new(&section, Some(executor as Arc<dyn CommandExecutor>))
}

fn words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

#[tokio::test]
async fn probe_runs_ffprobe_and_parses_dimensions() {
    let executor = Arc::new(RecordingExecutor::succeeding("1920,1080\n"));
    let toolchain = toolchain(Arc::clone(&executor));

    let dims = toolchain.probe(Path::new("/in/a.mp4")).await.unwrap();

    assert_eq!(dims, (1920, 1080));
    assert_eq!(
        executor.last(),
        words(
            "/opt/ffmpeg/bin/ffprobe -v error -select_streams v:0 -show_entries \
             stream=width,height -of csv=s=,:p=0 /in/a.mp4"
        )
    );
}

#[tokio::test]
async fn probe_rejects_unparseable_output() {
    let executor = Arc::new(RecordingExecutor::succeeding("N/A\n"));
    let toolchain = toolchain(executor);

    let err = toolchain.probe(Path::new("/in/a.mp4")).await.unwrap_err();

    assert!(matches!(err, ToolchainError::InvalidProbeOutput { .. }), "{err}");
}

#[tokio::test]
async fn transcode_builds_scaled_h264_command() {
    let executor = Arc::new(RecordingExecutor::succeeding(""));
    let toolchain = toolchain(Arc::clone(&executor));

    toolchain
        .transcode(
            Path::new("/in/a.mp4"),
            Path::new("/out/a-720p.mp4"),
            Geometry {
                width: 1280,
                height: 720,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        executor.last(),
        words(
            "/opt/ffmpeg/bin/ffmpeg -y -hide_banner -loglevel error -i /in/a.mp4 \
             -vf scale=1280:720,scale=trunc(iw/2)*2:trunc(ih/2)*2 \
             -c:v libx264 -preset veryfast -c:a aac -movflags +faststart /out/a-720p.mp4"
        )
    );
}

#[tokio::test]
async fn odd_geometry_is_trimmed_to_even_dimensions() {
    let executor = Arc::new(RecordingExecutor::succeeding(""));
    let toolchain = toolchain(Arc::clone(&executor));

    toolchain
        .transcode(
            Path::new("/in/a.mp4"),
            Path::new("/out/a-480p.mp4"),
            Geometry {
                width: 853,
                height: 480,
            },
        )
        .await
        .unwrap();

    let args = executor.last();
    assert!(!args.iter().any(|arg| arg == "-s"));
    let filter = args
        .iter()
        .position(|arg| arg == "-vf")
        .map(|index| args[index + 1].clone())
        .unwrap();
    assert_eq!(filter, "scale=853:480,scale=trunc(iw/2)*2:trunc(ih/2)*2");
}

#[tokio::test]
async fn extract_frame_seeks_before_input() {
    let executor = Arc::new(RecordingExecutor::succeeding(""));
    let toolchain = toolchain(Arc::clone(&executor));

    toolchain
        .extract_frame(Path::new("/in/a.mp4"), Path::new("/out/a.jpg"), "00:00:01")
        .await
        .unwrap();

    assert_eq!(
        executor.last(),
        words(
            "/opt/ffmpeg/bin/ffmpeg -y -hide_banner -loglevel error -ss 00:00:01 \
             -i /in/a.mp4 -frames:v 1 -q:v 2 /out/a.jpg"
        )
    );
}

#[tokio::test]
async fn non_zero_exit_carries_code_and_stderr() {
    let executor = Arc::new(RecordingExecutor::failing(1, "Invalid data found\n"));
    let toolchain = toolchain(executor);

    let err = toolchain
        .extract_frame(Path::new("/in/a.mp4"), Path::new("/out/a.jpg"), "00:00:01")
        .await
        .unwrap_err();

    match err {
        ToolchainError::CommandFailure {
            command,
            status,
            stderr,
        } => {
            assert!(command.starts_with("/opt/ffmpeg/bin/ffmpeg"));
            assert_eq!(status, Some(1));
            assert_eq!(stderr, "Invalid data found");
        }
        other => panic!("unexpected error: {other}"),
    }
}
