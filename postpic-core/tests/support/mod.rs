#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use postpic_core::ladder::Geometry;
use postpic_core::toolchain::{Toolchain, ToolchainError, ToolchainResult};
use postpic_core::workspace::AssetIdGenerator;

type FrameHook = Box<dyn Fn(&Path) + Send + Sync>;

/// Scriptable stand-in for ffmpeg/ffprobe. Outputs are written as small
/// marker files so callers can assert on the directory contents.
pub struct FakeToolchain {
    dimensions: Option<(u32, u32)>,
    failing_transcodes: HashSet<String>,
    failing_posters: HashSet<String>,
    fail_default_poster: bool,
    transcode_delay: Option<Duration>,
    slow_tiers: HashSet<String>,
    panicking_tiers: HashSet<String>,
    probe_delay: Option<Duration>,
    default_poster_delay: Option<Duration>,
    on_default_poster: Option<FrameHook>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeToolchain {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dimensions: Some((width, height)),
            failing_transcodes: HashSet::new(),
            failing_posters: HashSet::new(),
            fail_default_poster: false,
            transcode_delay: None,
            slow_tiers: HashSet::new(),
            panicking_tiers: HashSet::new(),
            probe_delay: None,
            default_poster_delay: None,
            on_default_poster: None,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn unprobeable() -> Self {
        Self {
            dimensions: None,
            ..Self::new(1, 1)
        }
    }

    pub fn fail_transcode(mut self, label: &str) -> Self {
        self.failing_transcodes.insert(label.to_string());
        self
    }

    pub fn fail_poster(mut self, label: &str) -> Self {
        self.failing_posters.insert(label.to_string());
        self
    }

    pub fn fail_default_poster(mut self) -> Self {
        self.fail_default_poster = true;
        self
    }

    /// Every transcode sleeps for `delay` before writing its output.
    pub fn with_transcode_delay(mut self, delay: Duration) -> Self {
        self.transcode_delay = Some(delay);
        self
    }

    /// Only the named tier sleeps for `delay`.
    pub fn slow_tier(mut self, label: &str, delay: Duration) -> Self {
        self.slow_tiers.insert(label.to_string());
        self.transcode_delay = Some(delay);
        self
    }

    pub fn slow_probe(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    pub fn slow_default_poster(mut self, delay: Duration) -> Self {
        self.default_poster_delay = Some(delay);
        self
    }

    /// The transcode for `label` panics instead of returning.
    pub fn panic_on(mut self, label: &str) -> Self {
        self.panicking_tiers.insert(label.to_string());
        self
    }

    /// Runs `hook` with the default poster path before it is written.
    pub fn on_default_poster(mut self, hook: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_default_poster = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transcoded_labels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("transcode ").map(str::to_string))
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(&self, command: String) -> ToolchainError {
        ToolchainError::CommandFailure {
            command,
            status: Some(1),
            stderr: "simulated failure".into(),
        }
    }
}

/// `{id}-{label}.{ext}` yields `label`; `{id}.{ext}` yields `None`.
pub fn tier_label(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().to_string();
    stem.split_once('-').map(|(_, label)| label.to_string())
}

fn write_marker(path: &Path, contents: &str) -> ToolchainResult<()> {
    std::fs::write(path, contents).map_err(|source| ToolchainError::Spawn {
        program: "fake".into(),
        source,
    })
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn probe(&self, input: &Path) -> ToolchainResult<(u32, u32)> {
        self.record("probe".into());
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        self.dimensions
            .ok_or_else(|| ToolchainError::InvalidProbeOutput {
                path: input.to_path_buf(),
                output: "N/A".into(),
            })
    }

    async fn transcode(
        &self,
        _input: &Path,
        output: &Path,
        geometry: Geometry,
    ) -> ToolchainResult<()> {
        let label = tier_label(output).unwrap_or_default();
        self.record(format!("transcode {label}"));
        if self.panicking_tiers.contains(&label) {
            panic!("encoder crashed on {label}");
        }

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let slow = self.slow_tiers.is_empty() || self.slow_tiers.contains(&label);
        if let (Some(delay), true) = (self.transcode_delay, slow) {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing_transcodes.contains(&label) {
            return Err(self.failure(format!("transcode {label}")));
        }
        write_marker(output, &geometry.to_string())
    }

    async fn extract_frame(
        &self,
        _input: &Path,
        output: &Path,
        timestamp: &str,
    ) -> ToolchainResult<()> {
        match tier_label(output) {
            Some(label) => {
                self.record(format!("poster {label}"));
                if self.failing_posters.contains(&label) {
                    return Err(self.failure(format!("poster {label}")));
                }
            }
            None => {
                self.record("default poster".into());
                if let Some(hook) = &self.on_default_poster {
                    hook(output);
                }
                if let Some(delay) = self.default_poster_delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail_default_poster {
                    return Err(self.failure("default poster".into()));
                }
            }
        }
        write_marker(output, timestamp)
    }
}

/// Hands out one predetermined id.
pub struct FixedId(pub &'static str);

impl AssetIdGenerator for FixedId {
    fn generate(&self) -> String {
        self.0.to_string()
    }
}

/// Yields a few bytes, then fails like a full disk.
pub struct FailingReader {
    served: bool,
}

impl FailingReader {
    pub fn new() -> Self {
        Self { served: false }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.served {
            return Poll::Ready(Err(io::Error::other("disk full")));
        }
        self.served = true;
        buf.put_slice(b"partial upload");
        Poll::Ready(Ok(()))
    }
}

pub fn upload_bytes() -> &'static [u8] {
    b"not really an mp4 but the fake toolchain does not care"
}

pub fn assets_root(base: &Path) -> PathBuf {
    base.join("assets")
}
