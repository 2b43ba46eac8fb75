use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::trace;

/// Command executed on each host unless overridden per host.
pub const DEFAULT_GPUSTAT_COMMAND: &str = "gpustat --color --gpuname-width 30 --show-power";

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Accepts `USER@HOSTNAME:PORT` with user and port optional.
static RE_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<user>[\w.-]+)@)?(?P<host>[^:@\s]+)(?::(?P<port>\d+))?$")
        .expect("host pattern is valid")
});

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Hosts in display order. The order is fixed for the process lifetime.
    pub hosts: Vec<HostConfig>,

    /// Seconds between poll cycles, per host.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Per-call execution budget in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bounded capacity of each viewer's outbound delivery queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Strict host-key validation. Disable only on trusted networks.
    #[serde(default = "default_verify_host")]
    pub verify_host: bool,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostConfig {
    pub hostname: String,

    /// SSH login user; `None` defers to the local ssh configuration.
    pub user: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Remote command line producing the status report.
    #[serde(default = "default_exec_command")]
    pub command: String,
}

impl HostConfig {
    /// Parse a `[USER@]HOSTNAME[:PORT]` string from the command line.
    pub fn parse(netloc: &str, default_port: u16) -> anyhow::Result<Self> {
        let caps = RE_HOST
            .captures(netloc.trim())
            .ok_or_else(|| anyhow::anyhow!("invalid host format: {netloc:?}"))?;

        let port = match caps.name("port") {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid port in {netloc:?}"))?,
            None => default_port,
        };

        Ok(Self {
            hostname: caps["host"].to_string(),
            user: caps.name("user").map(|m| m.as_str().to_string()),
            port,
            command: default_exec_command(),
        })
    }

    /// Identity used in renderings and subset filters.
    pub fn label(&self) -> &str {
        &self.hostname
    }
}

fn default_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    8
}

fn default_verify_host() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_exec_command() -> String {
    DEFAULT_GPUSTAT_COMMAND.to_string()
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
