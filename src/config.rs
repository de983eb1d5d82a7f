//! Daemon configuration.
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. TOML file given with `--config`
//! 3. Environment variables prefixed with `DERRICK_` (e.g. `DERRICK_LISTEN_ADDR`)
//! 4. Command-line flags

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;
use crate::profile::SystemProfile;
use crate::server::FrameLimits;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9090";
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_HISTORY_PATH: &str = "oil_well_history.json";

#[derive(Parser, Clone, Debug, Default)]
#[clap(author, version, about = "Well telemetry listener and history store", long_about = None)]
pub struct Args {
    /// Configuration file (TOML)
    #[clap(short, long, env = "DERRICK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address producers connect to
    #[clap(long)]
    pub listen_addr: Option<String>,

    /// Address of the HTTP read/admin API
    #[clap(long)]
    pub api_addr: Option<String>,

    /// History file
    #[clap(long)]
    pub history_path: Option<PathBuf>,

    /// Idle seconds after which a connection's payload is considered complete
    #[clap(long)]
    pub read_timeout_secs: Option<u64>,

    /// Upper bound in seconds on reading one payload
    #[clap(long)]
    pub max_read_secs: Option<u64>,

    #[clap(long)]
    pub max_payload_bytes: Option<usize>,

    /// Age in seconds after which the newest reading counts as stale
    #[clap(long)]
    pub stale_after_secs: Option<u64>,

    /// fsync every history write (defaults from the host profile)
    #[clap(long)]
    pub strict_durability: Option<bool>,

    #[clap(long)]
    pub worker_threads: Option<usize>,

    /// Default log filter when RUST_LOG is unset
    #[clap(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen_addr: String,
    pub api_addr: String,
    pub history_path: PathBuf,
    pub read_timeout_secs: u64,
    pub max_read_secs: u64,
    pub max_payload_bytes: usize,
    pub stale_after_secs: u64,
    #[serde(default)]
    pub strict_durability: Option<bool>,
    #[serde(default)]
    pub worker_threads: Option<usize>,
    pub log_level: String,
}

impl Settings {
    pub fn load(args: &Args) -> Result<Self> {
        let defaults = FrameLimits::default();

        let mut builder = Config::builder()
            .set_default("listen_addr", DEFAULT_LISTEN_ADDR)?
            .set_default("api_addr", DEFAULT_API_ADDR)?
            .set_default("history_path", DEFAULT_HISTORY_PATH)?
            .set_default("read_timeout_secs", defaults.idle_timeout.as_secs() as i64)?
            .set_default("max_read_secs", defaults.max_read_time.as_secs() as i64)?
            .set_default("max_payload_bytes", defaults.max_payload_bytes as i64)?
            .set_default("stale_after_secs", 30i64)?
            .set_default("log_level", "info")?;

        if let Some(path) = &args.config {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        let settings = builder
            .add_source(Environment::with_prefix("DERRICK").try_parsing(true))
            .set_override_option("listen_addr", args.listen_addr.clone())?
            .set_override_option("api_addr", args.api_addr.clone())?
            .set_override_option(
                "history_path",
                args.history_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("read_timeout_secs", args.read_timeout_secs.map(|v| v as i64))?
            .set_override_option("max_read_secs", args.max_read_secs.map(|v| v as i64))?
            .set_override_option("max_payload_bytes", args.max_payload_bytes.map(|v| v as i64))?
            .set_override_option("stale_after_secs", args.stale_after_secs.map(|v| v as i64))?
            .set_override_option("strict_durability", args.strict_durability)?
            .set_override_option("worker_threads", args.worker_threads.map(|v| v as i64))?
            .set_override_option("log_level", args.log_level.clone())?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            idle_timeout: Duration::from_secs(self.read_timeout_secs),
            max_read_time: Duration::from_secs(self.max_read_secs),
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn strict_durability(&self, profile: &SystemProfile) -> bool {
        self.strict_durability.unwrap_or(profile.strict_durability)
    }

    pub fn worker_threads(&self, profile: &SystemProfile) -> usize {
        self.worker_threads.unwrap_or(profile.worker_threads).max(1)
    }
}
