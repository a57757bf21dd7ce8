//! Storage for uploaded avatar and cover images.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::MediaConfig;

/// Takes ownership of a received file and returns its public URL.
///
/// Failures are not errors: the file is discarded and `None` is returned.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Option<String>;

    /// Deletes a previously stored file by the URL `upload` returned.
    async fn remove(&self, url: &str);
}

/// Moves uploads into a directory served under `public_base_url`.
pub struct LocalMediaStore {
    storage_path: PathBuf,
    public_base_url: String,
}

impl LocalMediaStore {
    #[must_use]
    pub fn new(storage_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.storage_path, config.public_base_url.clone())
    }

    #[must_use]
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    async fn store(&self, local_path: &Path) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.storage_path).await?;

        let name = match local_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext.to_ascii_lowercase()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let target = self.storage_path.join(&name);

        // rename fails across filesystems
        if tokio::fs::rename(local_path, &target).await.is_err() {
            tokio::fs::copy(local_path, &target).await?;
            tokio::fs::remove_file(local_path).await?;
        }

        Ok(name)
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, local_path: &Path) -> Option<String> {
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return None;
        }

        match self.store(local_path).await {
            Ok(name) => {
                debug!(file = %name, "Stored upload");
                Some(format!(
                    "{}/{}",
                    self.public_base_url.trim_end_matches('/'),
                    name
                ))
            }
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "Failed to store upload");
                let _ = tokio::fs::remove_file(local_path).await;
                None
            }
        }
    }

    async fn remove(&self, url: &str) {
        let Some(name) = url
            .strip_prefix(self.public_base_url.trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && *name != ".." && !name.contains(['/', '\\']))
        else {
            warn!(url = %url, "Refusing to remove media outside the storage directory");
            return;
        };

        match tokio::fs::remove_file(self.storage_path.join(name)).await {
            Ok(()) => debug!(file = %name, "Removed stored upload"),
            Err(e) => warn!(file = %name, error = %e, "Failed to remove stored upload"),
        }
    }
}
