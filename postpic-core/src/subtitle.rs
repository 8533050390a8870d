//! Placeholder caption tracks, written off the request path.

use std::path::PathBuf;
use std::sync::Mutex;

use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Builds the WebVTT body used until real captions exist.
pub fn placeholder_track(text: &str) -> String {
    format!("WEBVTT\n\n00:00:00.000 --> 00:00:05.000\n{text}\n")
}

#[derive(Debug, Clone)]
pub struct SubtitleJob {
    pub asset_id: String,
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleFailure {
    pub asset_id: String,
    pub path: PathBuf,
    pub message: String,
}

/// Supervised pool for subtitle jobs.
///
/// Jobs run on the tokio runtime and are never awaited by the pipeline.
/// A failed job is logged and reported on the failure channel handed out by
/// [`SubtitleJobs::new`]; it is not retried.
#[derive(Debug)]
pub struct SubtitleJobs {
    tasks: Mutex<JoinSet<()>>,
    failures: mpsc::UnboundedSender<SubtitleFailure>,
}

impl SubtitleJobs {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SubtitleFailure>) {
        let (failures, receiver) = mpsc::unbounded_channel();
        let jobs = Self {
            tasks: Mutex::new(JoinSet::new()),
            failures,
        };
        (jobs, receiver)
    }

    pub fn submit(&self, job: SubtitleJob) {
        let failures = self.failures.clone();
        let mut tasks = self.tasks.lock().unwrap();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match fs::write(&job.path, job.contents.as_bytes()).await {
                Ok(()) => {
                    debug!(asset_id = %job.asset_id, path = %job.path.display(), "subtitle stub written")
                }
                Err(err) => {
                    warn!(
                        asset_id = %job.asset_id,
                        path = %job.path.display(),
                        error = %err,
                        "failed to write subtitle stub"
                    );
                    let _ = failures.send(SubtitleFailure {
                        asset_id: job.asset_id,
                        path: job.path,
                        message: err.to_string(),
                    });
                }
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Waits for every submitted job to finish.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "subtitle job panicked");
            }
        }
    }
}
