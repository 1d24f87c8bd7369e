use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPLOAD_DIRECTORY: &str = "uploads";
pub const ENV_PREFIX: &str = "LANSTREAM";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load config file {path}: {source}")]
    Load {
        path: PathBuf,
        source: config::ConfigError,
    },
}

/// Settings read from the JSON config file, overridable per key through
/// `LANSTREAM_<KEY>` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_upload_directory")]
    pub upload_directory: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_directory: default_upload_directory(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Reads `path`, writing a default file first when it does not exist.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_bootstrap(path: &Path) -> Result<Self, ConfigError> {
        let exists = path.exists();
        if !exists {
            info!(path = %path.display(), "config file not found; writing defaults");
            if let Err(err) = Self::default().write_to(path) {
                warn!(path = %path.display(), error = %err, "could not write default config");
            }
        }

        config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(exists),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .and_then(|c| c.try_deserialize::<AppConfig>())
            .map_err(|source| ConfigError::Load {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let data = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, data)
    }
}

fn default_upload_directory() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOAD_DIRECTORY)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
