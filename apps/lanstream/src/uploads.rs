use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid upload filename: {0:?}")]
    InvalidName(String),
    #[error("upload storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The directory uploaded files land in. Files are addressed by bare name;
/// anything that would escape the directory is rejected.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| self.io_error(&self.root, source))
    }

    /// Writes `bytes` under `name`, replacing any file of the same name.
    /// Returns the stored name.
    pub async fn store(&self, name: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let name = sanitize_filename(name)?;
        self.ensure().await?;
        let path = self.root.join(&name);
        fs::write(&path, bytes)
            .await
            .map_err(|source| self.io_error(&path, source))?;
        Ok(name)
    }

    pub async fn remove(&self, name: &str) -> Result<(), UploadError> {
        let name = sanitize_filename(name)?;
        let path = self.root.join(name);
        fs::remove_file(&path)
            .await
            .map_err(|source| self.io_error(&path, source))
    }

    /// Deletes the directory with everything in it and recreates it empty.
    pub async fn reset(&self) -> Result<(), UploadError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(self.io_error(&self.root, source)),
        }
        self.ensure().await
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> UploadError {
        UploadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Accepts a plain file name only: no separators, no `.`/`..`, not empty.
pub fn sanitize_filename(raw: &str) -> Result<String, UploadError> {
    let trimmed = raw.trim();
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if !trimmed.contains('\\') => name
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| UploadError::InvalidName(raw.to_string())),
        _ => Err(UploadError::InvalidName(raw.to_string())),
    }
}
