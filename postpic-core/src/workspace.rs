//! Per-asset scratch directories.
//!
//! Every upload gets a fresh identifier and its own `{root}/{id}/` directory.
//! All artifacts derived from the upload are written there, following a
//! fixed naming scheme (see the path helpers on [`Asset`]).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid asset id {0:?}")]
    InvalidId(String),
    #[error("workspace {path} already exists")]
    AlreadyExists { path: PathBuf },
    #[error("failed to create workspace {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
#[error("failed to store upload at {path}: {source}")]
pub struct IntakeError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

/// Produces identifiers for new assets.
pub trait AssetIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidAssetIds;

impl AssetIdGenerator for UuidAssetIds {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// One upload and the directory that holds everything derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    pub work_dir: PathBuf,
}

impl Asset {
    pub fn source_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.mp4", self.id))
    }

    pub fn rendition_path(&self, tier_label: &str) -> PathBuf {
        self.work_dir.join(format!("{}-{}.mp4", self.id, tier_label))
    }

    pub fn tier_poster_path(&self, tier_label: &str) -> PathBuf {
        self.work_dir.join(format!("{}-{}.jpg", self.id, tier_label))
    }

    pub fn default_poster_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.jpg", self.id))
    }

    pub fn subtitle_path(&self, language: &str) -> PathBuf {
        self.work_dir.join(format!("{}-{}.vtt", self.id, language))
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn asset_dir(&self, asset_id: &str) -> PathBuf {
        self.root.join(asset_id)
    }

    pub async fn allocate(&self, ids: &dyn AssetIdGenerator) -> Result<Asset, WorkspaceError> {
        self.allocate_with_id(&ids.generate()).await
    }

    /// Creates `{root}/{asset_id}`. The directory must not exist yet, so no
    /// two pipeline runs ever share a workspace.
    pub async fn allocate_with_id(&self, asset_id: &str) -> Result<Asset, WorkspaceError> {
        if !is_valid_asset_id(asset_id) {
            return Err(WorkspaceError::InvalidId(asset_id.to_string()));
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: self.root.clone(),
                source,
            })?;
        let work_dir = self.asset_dir(asset_id);
        match fs::create_dir(&work_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::AlreadyExists { path: work_dir });
            }
            Err(source) => {
                return Err(WorkspaceError::Create {
                    path: work_dir,
                    source,
                })
            }
        }
        debug!(asset_id, path = %work_dir.display(), "workspace allocated");
        Ok(Asset {
            id: asset_id.to_string(),
            work_dir,
        })
    }

    /// Streams the upload into `{work_dir}/{id}.mp4`.
    pub async fn save_original<R>(
        &self,
        asset: &Asset,
        reader: &mut R,
    ) -> Result<PathBuf, IntakeError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = asset.source_path();
        let intake = |source| IntakeError {
            path: path.clone(),
            source,
        };
        let file = fs::File::create(&path).await.map_err(intake)?;
        let mut writer = BufWriter::new(file);
        let bytes = tokio::io::copy(reader, &mut writer).await.map_err(intake)?;
        writer.flush().await.map_err(intake)?;
        writer.get_mut().sync_all().await.map_err(intake)?;
        debug!(asset_id = %asset.id, bytes, "original stored");
        Ok(path)
    }

    /// Removes the asset directory and everything in it.
    pub async fn purge(&self, asset: &Asset) {
        match fs::remove_dir_all(&asset.work_dir).await {
            Ok(()) => debug!(asset_id = %asset.id, "workspace purged"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                asset_id = %asset.id,
                path = %asset.work_dir.display(),
                error = %err,
                "failed to purge workspace"
            ),
        }
    }
}

fn is_valid_asset_id(asset_id: &str) -> bool {
    !asset_id.is_empty()
        && asset_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
