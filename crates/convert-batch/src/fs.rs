//! File-system collaborators used by the runner

use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait FileSystem: Send + Sync + 'static {
    /// Ask for a destination directory. `None` means the user backed out.
    async fn pick_directory(&self, default: Option<&Path>) -> Option<PathBuf>;

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;

    async fn file_size(&self, path: &Path) -> std::io::Result<u64>;

    async fn exists(&self, path: &Path) -> bool;
}

/// Local disk access through `tokio::fs`.
///
/// There is no interactive picker here: the destination is fixed up front, or
/// falls back to the suggested default.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    destination: Option<PathBuf>,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: Some(destination.into()),
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn pick_directory(&self, default: Option<&Path>) -> Option<PathBuf> {
        let dir = self
            .destination
            .clone()
            .or_else(|| default.map(Path::to_path_buf))?;

        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Some(dir),
            Ok(_) => {
                log::error!("Destination is not a directory: {}", dir.display());
                None
            }
            Err(e) => {
                log::error!("Destination {} is unavailable: {}", dir.display(), e);
                None
            }
        }
    }

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(path, bytes).await
    }

    async fn file_size(&self, path: &Path) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
