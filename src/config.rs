use crate::history::buffer::MAX_CAPACITY;
use crate::history::entry::MAX_LEVEL;
use crate::history::policy::DEFAULT_CHANGE_THRESHOLD;
use crate::history::relay::Role;
use anyhow::{bail, Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HistoryConfig {
    /// Buffer capacity; oldest entries are evicted beyond this.
    pub max_entries: usize,
    /// Unconditional sampling interval.
    pub save_interval_minutes: u64,
    /// Minimum level delta (percent) for change-triggered entries.
    pub change_threshold: u8,
    /// Key prefix in the key-value store.
    pub namespace: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            save_interval_minutes: 60,
            change_threshold: DEFAULT_CHANGE_THRESHOLD,
            namespace: "battery_history".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `history.db`. `~` is expanded.
    pub db_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_dir = directories::ProjectDirs::from("", "", "battery-history")
            .map(|dirs| dirs.data_dir().display().to_string())
            .unwrap_or_else(|| "~/.battery-history".into());
        Self { db_dir }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Power-supply capacity attribute to poll.
    pub sysfs_path: String,
    pub poll_interval_secs: u64,
    /// Pin the level instead of reading sysfs (hosts without a battery).
    pub fixed_level: Option<u8>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sysfs_path: "/sys/class/power_supply/BAT0/capacity".into(),
            poll_interval_secs: 30,
            fixed_level: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RelayConfig {
    pub role: Role,
    /// Aggregating device to stream frames to over UDP. Unset keeps the
    /// aggregating side in-process (reporting role only).
    pub peer_addr: Option<String>,
    /// UDP address the aggregating role receives frames on.
    pub listen_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            peer_addr: None,
            listen_addr: "0.0.0.0:47800".into(),
        }
    }
}

impl Config {
    /// `<config dir>/battery-history/config.toml`, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "battery-history")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when it exists,
    /// falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => {
                    tracing::debug!("no config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("loading config: {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }

    pub fn validate(&self) -> Result<()> {
        let history = &self.history;
        if history.max_entries == 0 || history.max_entries > MAX_CAPACITY {
            bail!(
                "history.max_entries must be within 1..={MAX_CAPACITY}, got {}",
                history.max_entries
            );
        }
        if history.change_threshold > MAX_LEVEL {
            bail!(
                "history.change_threshold must be at most {MAX_LEVEL}, got {}",
                history.change_threshold
            );
        }
        if history.save_interval_minutes == 0 {
            bail!("history.save_interval_minutes must be positive");
        }
        if history.namespace.is_empty() {
            bail!("history.namespace must not be empty");
        }
        if self.telemetry.poll_interval_secs == 0 {
            bail!("telemetry.poll_interval_secs must be positive");
        }
        if self.telemetry.fixed_level.is_some_and(|level| level > MAX_LEVEL) {
            bail!("telemetry.fixed_level must be at most {MAX_LEVEL}");
        }
        self.peer_addr()?;
        self.listen_addr()?;
        Ok(())
    }

    pub fn db_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.db_dir).into_owned())
    }

    pub fn sysfs_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.telemetry.sysfs_path).into_owned())
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.history.save_interval_minutes.saturating_mul(60))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.poll_interval_secs)
    }

    pub fn peer_addr(&self) -> Result<Option<SocketAddr>> {
        self.relay
            .peer_addr
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .with_context(|| format!("relay.peer_addr is not a socket address: {raw}"))
            })
            .transpose()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let raw = &self.relay.listen_addr;
        raw.parse()
            .with_context(|| format!("relay.listen_addr is not a socket address: {raw}"))
    }

    pub fn json_schema() -> Result<String> {
        serde_json::to_string_pretty(&schemars::schema_for!(Config))
            .context("serializing config schema")
    }
}
