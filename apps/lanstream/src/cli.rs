use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::AppConfig;
use crate::history::DEFAULT_RECENT_CAPACITY;
use crate::hub::DEFAULT_CONNECTION_BUFFER;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 << 20;

#[derive(Debug, Parser)]
#[command(
    name = "lanstream",
    author,
    version,
    about = "Share text and files with every browser on the local network"
)]
pub struct Cli {
    /// JSON config file holding `upload_directory` and `port`; created with
    /// defaults when missing.
    #[arg(long, env = "LANSTREAM_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// File the full event history is persisted to.
    #[arg(long, env = "LANSTREAM_HISTORY_FILE", default_value = "history.json")]
    pub history_file: PathBuf,

    /// Directory holding the browser client (`index.html`, scripts),
    /// relative to the working directory unless absolute.
    #[arg(long, env = "LANSTREAM_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Interface to listen on; the port comes from the config file.
    #[arg(long, env = "LANSTREAM_BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: IpAddr,

    /// Number of most recent events kept in the in-memory window.
    #[arg(long, env = "LANSTREAM_RECENT_CAPACITY", default_value_t = DEFAULT_RECENT_CAPACITY)]
    pub recent_capacity: usize,

    /// Largest accepted upload request body, in bytes.
    #[arg(long, env = "LANSTREAM_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Outbound frames buffered per WebSocket before the client is dropped.
    #[arg(long, env = "LANSTREAM_CONNECTION_BUFFER", default_value_t = DEFAULT_CONNECTION_BUFFER)]
    pub connection_buffer: usize,

    /// Seconds websocket clients get to receive their close frame at shutdown.
    #[arg(long, env = "LANSTREAM_SHUTDOWN_GRACE_SECS", default_value_t = 1)]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub upload_directory: PathBuf,
    pub history_file: PathBuf,
    pub static_dir: PathBuf,
    pub recent_capacity: usize,
    pub max_upload_bytes: usize,
    pub connection_buffer: usize,
    pub shutdown_grace: Duration,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let app = AppConfig::load_or_bootstrap(&cli.config)
            .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;
        if cli.connection_buffer == 0 {
            anyhow::bail!("--connection-buffer must be at least 1");
        }

        Ok(ServerConfig {
            listen_addr: SocketAddr::new(cli.bind_host, app.port),
            upload_directory: app.upload_directory,
            history_file: cli.history_file,
            static_dir: cli.static_dir,
            recent_capacity: cli.recent_capacity,
            max_upload_bytes: cli.max_upload_bytes,
            connection_buffer: cli.connection_buffer,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}
