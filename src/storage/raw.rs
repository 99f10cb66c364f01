use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use crate::cli::config::OutputSettings;
use crate::crawler::task::OutputArtifact;
use crate::error::CrawlError;

/// Persists raw page artifacts
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Write `artifact`, creating parent directories and replacing any
    /// existing file. Returns where the artifact ended up.
    async fn write(&self, artifact: &OutputArtifact) -> Result<PathBuf, CrawlError>;
}

/// Factory for the raw artifact writer
pub struct RawStorage;

impl RawStorage {
    pub fn create(settings: &OutputSettings) -> Arc<dyn ArtifactWriter> {
        Arc::new(FilesystemWriter::new(&settings.raw_dir))
    }
}

/// Writes artifacts below a root directory
#[derive(Debug, Clone)]
pub struct FilesystemWriter {
    root: PathBuf,
}

impl FilesystemWriter {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

#[async_trait]
impl ArtifactWriter for FilesystemWriter {
    async fn write(&self, artifact: &OutputArtifact) -> Result<PathBuf, CrawlError> {
        let path = self.root.join(&artifact.path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| CrawlError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        fs::write(&path, artifact.body.as_bytes())
            .await
            .map_err(|source| CrawlError::Write {
                path: path.clone(),
                source,
            })?;

        debug!("Stored {} bytes at {}", artifact.body.len(), path.display());

        Ok(path)
    }
}
