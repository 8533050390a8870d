mod error;
mod poster;
mod rendition;
mod types;

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::ladder::plan_ladder;
use crate::status::{PipelineStage, StatusHub};
use crate::subtitle::{placeholder_track, SubtitleJob, SubtitleJobs};
use crate::toolchain::{Toolchain, ToolchainError};
use crate::workspace::{Asset, AssetIdGenerator, UuidAssetIds, Workspace};

pub use error::{PipelineError, PipelineResult, TierError};
pub use poster::PosterGenerator;
pub use rendition::{RenditionTranscoder, TierLoopReport};
pub use types::{
    Manifest, PipelineSettings, Rendition, RenditionEntry, SourceVideo, SubtitleSettings,
    DEFAULT_POSTER_TIMESTAMP, DEFAULT_PUBLIC_PREFIX,
};

/// Turns one upload into a manifest.
///
/// A `Pipeline` is cheap to clone and is meant to be shared by every upload
/// a process handles: the transcode permits are shared too, so the bound in
/// [`PipelineSettings::max_concurrent_transcodes`] holds across uploads.
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<PipelineSettings>,
    workspace: Workspace,
    toolchain: Arc<dyn Toolchain>,
    ids: Arc<dyn AssetIdGenerator>,
    permits: Arc<Semaphore>,
    status: StatusHub,
    subtitles: Arc<SubtitleJobs>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        toolchain: Arc<dyn Toolchain>,
        subtitles: Arc<SubtitleJobs>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_transcodes));
        Self {
            workspace: Workspace::new(settings.root_dir.clone()),
            settings: Arc::new(settings),
            toolchain,
            ids: Arc::new(UuidAssetIds),
            permits,
            status: StatusHub::new(),
            subtitles,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn AssetIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_status_hub(mut self, status: StatusHub) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> &StatusHub {
        &self.status
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Stores `upload` under a fresh asset id and runs the full pipeline.
    pub async fn ingest<R>(&self, upload: &mut R) -> PipelineResult<Manifest>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let asset = self.workspace.allocate(self.ids.as_ref()).await?;
        self.process(asset, upload).await
    }

    /// Like [`Pipeline::ingest`] with a caller-chosen id.
    pub async fn ingest_with_id<R>(&self, asset_id: &str, upload: &mut R) -> PipelineResult<Manifest>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let asset = self.workspace.allocate_with_id(asset_id).await?;
        self.process(asset, upload).await
    }

    async fn process<R>(&self, asset: Asset, upload: &mut R) -> PipelineResult<Manifest>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let settings = self.settings.as_ref();
        self.status.publish(&asset.id, PipelineStage::Allocated);

        let source_path = match self.workspace.save_original(&asset, upload).await {
            Ok(path) => path,
            Err(source) => {
                let asset_id = asset.id.clone();
                return self
                    .abort(&asset, PipelineError::Intake { asset_id, source })
                    .await;
            }
        };
        self.status.publish(&asset.id, PipelineStage::SourceSaved);

        let probed = timeout(settings.probe_timeout, self.toolchain.probe(&source_path))
            .await
            .unwrap_or(Err(ToolchainError::Timeout {
                operation: "probe",
                timeout: settings.probe_timeout,
            }));
        let (width, height) = match probed {
            Ok(dimensions) => dimensions,
            Err(source) => {
                let asset_id = asset.id.clone();
                return self
                    .abort(&asset, PipelineError::Probe { asset_id, source })
                    .await;
            }
        };
        let source = SourceVideo {
            path: source_path,
            width,
            height,
        };
        self.status
            .publish(&asset.id, PipelineStage::DimensionsProbed { width, height });

        let ladder = plan_ladder(width, height, &settings.tiers);
        info!(
            asset_id = %asset.id,
            width,
            height,
            tiers = ladder.len(),
            "ladder planned"
        );
        self.status.publish(
            &asset.id,
            PipelineStage::LadderPlanned {
                tiers: ladder.iter().map(|planned| planned.tier.label.clone()).collect(),
            },
        );

        let posters = PosterGenerator::new(
            Arc::clone(&self.toolchain),
            settings.poster_timestamp.clone(),
        );
        let transcoder = RenditionTranscoder::new(
            Arc::clone(&self.toolchain),
            posters.clone(),
            Arc::clone(&self.permits),
            settings.tier_timeout,
            self.status.clone(),
        );
        let report = transcoder.run(&asset, &source.path, &ladder).await;

        let cover = timeout(
            settings.tier_timeout,
            posters.default_poster(&asset, &source.path),
        )
        .await
        .unwrap_or(Err(ToolchainError::Timeout {
            operation: "default poster",
            timeout: settings.tier_timeout,
        }));
        if let Err(source) = cover {
            let asset_id = asset.id.clone();
            return self
                .abort(&asset, PipelineError::FatalPoster { asset_id, source })
                .await;
        }
        self.status
            .publish(&asset.id, PipelineStage::DefaultPosterReady);

        if report.renditions.is_empty() && settings.require_rendition {
            let asset_id = asset.id.clone();
            return self
                .abort(&asset, PipelineError::NoRenditions { asset_id })
                .await;
        }

        let language = settings
            .subtitles
            .as_ref()
            .map(|subtitles| subtitles.language.as_str());
        let manifest = Manifest::assemble(
            &asset,
            &report.renditions,
            &settings.public_prefix,
            language,
        );

        if let Some(subtitles) = &settings.subtitles {
            self.subtitles.submit(SubtitleJob {
                asset_id: asset.id.clone(),
                path: asset.subtitle_path(&subtitles.language),
                contents: placeholder_track(&subtitles.placeholder_text),
            });
        }

        self.status.publish(&asset.id, PipelineStage::ManifestReady);
        info!(
            asset_id = %asset.id,
            renditions = manifest.renditions.len(),
            skipped = report.skipped.len(),
            "manifest ready"
        );
        Ok(manifest)
    }

    async fn abort<T>(&self, asset: &Asset, err: PipelineError) -> PipelineResult<T> {
        warn!(asset_id = %asset.id, kind = err.kind(), error = %err, "pipeline aborted");
        self.workspace.purge(asset).await;
        self.status.publish(
            &asset.id,
            PipelineStage::Aborted {
                reason: err.to_string(),
            },
        );
        Err(err)
    }
}
