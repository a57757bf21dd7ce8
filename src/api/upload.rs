//! Multipart form handling. File parts are spooled to the temp directory
//! before the services see them.

use axum::extract::Multipart;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::ApiError;

/// A received file on local disk. Removed on drop unless something moved it.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
}

impl SpooledFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.path);
        let remove = move || {
            if let Err(e) = std::fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp upload");
            }
        };

        // Off the async workers when there is a runtime to hand it to
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, SpooledFile>,
}

impl MultipartForm {
    pub async fn read(mut multipart: Multipart, temp_dir: &Path) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(ToString::to_string) else {
                continue;
            };

            let file_name = field.file_name().map(ToString::to_string);
            let Some(file_name) = file_name else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Invalid field {name}: {e}")))?;
                form.fields.insert(name, text);
                continue;
            };

            // Browsers send an empty part for an unselected file input
            if file_name.is_empty() {
                continue;
            }

            tokio::fs::create_dir_all(temp_dir)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to create temp dir: {e}")))?;

            let spooled = SpooledFile {
                path: temp_dir.join(spool_name(&file_name)),
            };
            let mut file = tokio::fs::File::create(spooled.path())
                .await
                .map_err(|e| ApiError::internal(format!("Failed to create temp file: {e}")))?;

            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ApiError::validation(format!("Failed to read {name}: {e}")))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to write temp file: {e}")))?;
            }
            file.flush()
                .await
                .map_err(|e| ApiError::internal(format!("Failed to write temp file: {e}")))?;

            form.files.insert(name, spooled);
        }

        Ok(form)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&SpooledFile> {
        self.files.get(name)
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> Option<PathBuf> {
        self.file(name).map(|f| f.path().to_path_buf())
    }
}

/// Random name that keeps a sane extension from the client's file name.
fn spool_name(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
        None => uuid::Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spool_name_keeps_safe_extension() {
        assert!(spool_name("me.png").ends_with(".png"));
        assert!(!spool_name("../../etc/passwd").contains('/'));
        assert!(!spool_name("evil.p/ng").contains('/'));
        assert!(!spool_name("noext").contains('.'));
    }

    #[tokio::test]
    async fn test_spooled_file_removed_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.png");
        tokio::fs::write(&path, b"img").await.unwrap();

        drop(SpooledFile { path: path.clone() });

        for _ in 0..100 {
            if !tokio::fs::try_exists(&path).await.unwrap() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("temp upload still present: {}", path.display());
    }

    #[test]
    fn test_spooled_file_removed_on_drop_without_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.png");
        std::fs::write(&path, b"img").unwrap();

        drop(SpooledFile { path: path.clone() });
        assert!(!path.exists());
    }
}
