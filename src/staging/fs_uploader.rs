//! Filesystem implementation of [`Uploader`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use super::Uploader;

/// Copies staged files into a filesystem prefix, e.g. a mounted bucket.
///
/// Paths below `local_prefix` keep their relative layout; anything staged
/// outside the prefix lands flat under the remote prefix by file name.
pub struct FsUploader {
    overwrite: bool,
}

impl FsUploader {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }
}

#[async_trait]
impl Uploader for FsUploader {
    async fn upload(
        &self,
        locations: &[String],
        local_prefix: &Path,
        remote_prefix: &str,
    ) -> Result<Vec<String>> {
        let remote_root = PathBuf::from(remote_prefix);
        let mut uploaded = Vec::with_capacity(locations.len());

        for location in locations {
            let source = Path::new(location);
            let relative = source
                .strip_prefix(local_prefix)
                .ok()
                .map(Path::to_path_buf)
                .or_else(|| source.file_name().map(PathBuf::from))
                .with_context(|| format!("staged location has no file name: {location}"))?;

            let destination = remote_root.join(&relative);
            if !self.overwrite && tokio::fs::try_exists(&destination).await? {
                bail!("remote object already exists: {}", destination.display());
            }
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            tokio::fs::copy(source, &destination)
                .await
                .with_context(|| format!("failed to upload {location}"))?;

            uploaded.push(destination.to_string_lossy().into_owned());
        }

        Ok(uploaded)
    }
}
