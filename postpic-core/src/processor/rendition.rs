use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::ladder::PlannedTier;
use crate::status::{PipelineStage, StatusHub};
use crate::toolchain::Toolchain;
use crate::workspace::Asset;

use super::error::TierError;
use super::poster::PosterGenerator;
use super::types::Rendition;

/// Result of the tier loop for one asset.
#[derive(Debug, Default)]
pub struct TierLoopReport {
    /// Ordered best quality first.
    pub renditions: Vec<Rendition>,
    pub skipped: Vec<TierError>,
}

/// Runs transcode + poster for every planned tier.
///
/// Tiers are independent: each reads the shared original and writes only
/// its own outputs, so they run concurrently, limited by `permits`. A tier
/// that fails or exceeds `tier_timeout` is left out; the others are not
/// affected.
#[derive(Clone)]
pub struct RenditionTranscoder {
    toolchain: Arc<dyn Toolchain>,
    posters: PosterGenerator,
    permits: Arc<Semaphore>,
    tier_timeout: Duration,
    status: StatusHub,
}

impl RenditionTranscoder {
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        posters: PosterGenerator,
        permits: Arc<Semaphore>,
        tier_timeout: Duration,
        status: StatusHub,
    ) -> Self {
        Self {
            toolchain,
            posters,
            permits,
            tier_timeout,
            status,
        }
    }

    pub async fn run(
        &self,
        asset: &Asset,
        source: &Path,
        ladder: &[PlannedTier],
    ) -> TierLoopReport {
        let mut jobs = JoinSet::new();
        let mut labels = HashMap::new();
        for planned in ladder {
            let job = self.clone();
            let asset = asset.clone();
            let source = source.to_path_buf();
            let planned = planned.clone();
            let label = planned.tier.label.clone();
            let handle = jobs.spawn(async move { job.produce(&asset, &source, &planned).await });
            labels.insert(handle.id(), label);
        }

        let mut report = TierLoopReport::default();
        while let Some(joined) = jobs.join_next_with_id().await {
            let (label, outcome) = match joined {
                Ok((id, outcome)) => (labels.remove(&id).unwrap_or_default(), outcome),
                Err(err) => {
                    let label = labels.remove(&err.id()).unwrap_or_default();
                    let outcome = Err(TierError::Aborted {
                        tier: label.clone(),
                        reason: err.to_string(),
                    });
                    (label, outcome)
                }
            };
            match outcome {
                Ok(rendition) => {
                    info!(asset_id = %asset.id, tier = %label, "rendition ready");
                    self.status
                        .publish(&asset.id, PipelineStage::TierReady { tier: label });
                    report.renditions.push(rendition);
                }
                Err(err) => {
                    warn!(asset_id = %asset.id, tier = %label, error = %err, "skipping tier");
                    self.status.publish(
                        &asset.id,
                        PipelineStage::TierSkipped {
                            tier: label,
                            reason: err.to_string(),
                        },
                    );
                    report.skipped.push(err);
                }
            }
        }
        report.renditions.sort_by_key(|rendition| rendition.rank);
        report
    }

    async fn produce(
        &self,
        asset: &Asset,
        source: &Path,
        planned: &PlannedTier,
    ) -> Result<Rendition, TierError> {
        let label = planned.tier.label.clone();
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TierError::Cancelled {
                tier: label.clone(),
            })?;
        let deadline = Instant::now() + self.tier_timeout;

        let output_path = asset.rendition_path(&label);
        let transcode = self
            .toolchain
            .transcode(source, &output_path, planned.geometry());
        match timeout_at(deadline, transcode).await {
            Err(_) => {
                return Err(TierError::TimedOut {
                    tier: label,
                    stage: "transcode",
                    timeout: self.tier_timeout,
                })
            }
            Ok(Err(source)) => return Err(TierError::Transcode { tier: label, source }),
            Ok(Ok(())) => {}
        }

        let poster_path = asset.tier_poster_path(&label);
        match timeout_at(deadline, self.posters.tier_poster(&output_path, &poster_path)).await {
            Err(_) => {
                return Err(TierError::TimedOut {
                    tier: label,
                    stage: "poster",
                    timeout: self.tier_timeout,
                })
            }
            Ok(Err(source)) => return Err(TierError::Poster { tier: label, source }),
            Ok(Ok(())) => {}
        }

        Ok(Rendition {
            tier_label: label,
            rank: planned.rank,
            width: planned.fitted_width,
            height: planned.tier.max_height,
            output_path,
            poster_path,
        })
    }
}
