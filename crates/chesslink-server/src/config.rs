//! Server configuration: TOML file + CLI overrides.

use crate::session::MatchPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub pairing: PairingSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Seconds without activity before a session is collected.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Seconds between GC sweeps.
    #[serde(default = "default_gc_interval")]
    pub gc_interval: u64,
    /// Per-connection outbound queue length.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            idle_timeout: default_idle_timeout(),
            gc_interval: default_gc_interval(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// `[pairing]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairingSection {
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_max_sessions() -> usize {
    1000
}
fn default_idle_timeout() -> u64 {
    3600
}
fn default_gc_interval() -> u64 {
    60
}
fn default_outbound_queue() -> usize {
    64
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_sessions: Option<usize>,
    pub idle_timeout: Option<u64>,
    pub match_policy: Option<MatchPolicy>,
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_sessions: usize,
    pub idle_timeout: Duration,
    pub gc_interval: Duration,
    pub outbound_queue: usize,
    pub match_policy: MatchPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let file = ServerSection::default();
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: file.port,
            max_sessions: file.max_sessions,
            idle_timeout: Duration::from_secs(file.idle_timeout),
            gc_interval: Duration::from_secs(file.gc_interval),
            outbound_queue: file.outbound_queue,
            match_policy: MatchPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded).with_context(|| {
                        format!("failed to read config at {}", expanded.display())
                    })?;
                    toml::from_str::<ConfigFile>(&content).with_context(|| {
                        format!("failed to parse config at {}", expanded.display())
                    })?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::resolve(file_config, cli)
    }

    fn resolve(file: ConfigFile, cli: CliOverrides) -> Result<Self> {
        let host = cli.host.unwrap_or(file.server.host);
        let host: IpAddr = host
            .parse()
            .with_context(|| format!("invalid listen address {host:?}"))?;
        Ok(Self {
            host,
            port: cli.port.unwrap_or(file.server.port),
            max_sessions: cli.max_sessions.unwrap_or(file.server.max_sessions),
            idle_timeout: Duration::from_secs(
                cli.idle_timeout.unwrap_or(file.server.idle_timeout),
            ),
            gc_interval: Duration::from_secs(file.server.gc_interval.max(1)),
            outbound_queue: file.server.outbound_queue.max(1),
            match_policy: cli.match_policy.unwrap_or(file.pairing.match_policy),
        })
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
