use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_LOG_FILE: &str = "activity.log";

/// Configuration written on first run when no config file exists
pub const DEFAULT_CONFIG: &str = include_str!("../../config.example.yaml");

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Default retention limit for clients that do not set their own
    #[serde(default)]
    pub torrent_retention_limit: Option<usize>,
    #[serde(default)]
    pub clients: BTreeMap<String, ClientConfig>,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterConfig>,
    #[serde(default)]
    pub trackers: TrackersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub filter: String,
    pub download_path: Option<PathBuf>,
    /// Client path prefix -> local path prefix, applied during orphan scans
    #[serde(default)]
    pub download_path_mapping: BTreeMap<String, String>,
    pub free_space_path: Option<String>,
    pub torrent_retention_limit: Option<usize>,
    #[serde(flatten)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Qbittorrent(QbittorrentConfig),
    Deluge(DelugeConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct QbittorrentConfig {
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelugeConfig {
    /// Base url of the Deluge Web UI, e.g. http://localhost:8112
    pub url: String,
    #[serde(default)]
    pub password: String,
    /// Daemon host id to connect the Web UI to when it is not connected yet
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub label: Vec<LabelRuleConfig>,
    #[serde(default)]
    pub tag: Vec<TagRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelRuleConfig {
    pub name: String,
    #[serde(default)]
    pub update: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRuleConfig {
    pub name: String,
    pub mode: TagMode,
    #[serde(default)]
    pub update: Vec<String>,
}

/// Which direction a tag rule may change a torrent's tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    Add,
    Remove,
    Full,
}

impl TagMode {
    pub fn adds(&self) -> bool {
        matches!(self, TagMode::Add | TagMode::Full)
    }

    pub fn removes(&self) -> bool {
        matches!(self, TagMode::Remove | TagMode::Full)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackersConfig {
    pub bhd: Option<BhdConfig>,
    pub ptp: Option<PtpConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BhdConfig {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PtpConfig {
    #[serde(default)]
    pub api_user: String,
    #[serde(default)]
    pub api_key: String,
}

fn default_enabled() -> bool {
    true
}

/// Platform config directory for tqm, falling back to the working directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("tqm"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl ConnectionConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionConfig::Qbittorrent(_) => "qbittorrent",
            ConnectionConfig::Deluge(_) => "deluge",
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)?;

        Ok(config)
    }

    /// Write the default configuration to `path`, creating parent directories
    ///
    /// Fails if the file already exists.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .context(format!("Failed to create config file: {}", path.display()))?;
        std::io::Write::write_all(&mut file, DEFAULT_CONFIG.as_bytes())
            .context(format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.torrent_retention_limit == Some(0) {
            return Err(invalid(
                "torrent_retention_limit",
                "must be greater than 0 when set",
            ));
        }

        for (name, client) in &self.clients {
            if client.torrent_retention_limit == Some(0) {
                return Err(invalid(
                    &format!("clients.{}.torrent_retention_limit", name),
                    "must be greater than 0 when set",
                ));
            }

            let url = match &client.connection {
                ConnectionConfig::Qbittorrent(c) => &c.url,
                ConnectionConfig::Deluge(c) => &c.url,
            };
            if url.is_empty() {
                return Err(invalid(&format!("clients.{}.url", name), "must not be empty"));
            }
        }

        for (name, filter) in &self.filters {
            for (i, rule) in filter.label.iter().enumerate() {
                let setting = format!("filters.{}.label[{}]", name, i);
                if rule.name.is_empty() {
                    return Err(invalid(&setting, "name must not be empty"));
                }
                if rule.update.is_empty() {
                    return Err(invalid(&setting, "update must contain at least one expression"));
                }
            }

            for (i, rule) in filter.tag.iter().enumerate() {
                let setting = format!("filters.{}.tag[{}]", name, i);
                if rule.name.is_empty() {
                    return Err(invalid(&setting, "name must not be empty"));
                }
                if rule.update.is_empty() {
                    return Err(invalid(&setting, "update must contain at least one expression"));
                }
            }
        }

        Ok(())
    }

    /// Look up an enabled client by name
    pub fn client(&self, name: &str) -> Result<&ClientConfig, ConfigError> {
        let client = self
            .clients
            .get(name)
            .ok_or_else(|| ConfigError::UnknownClient(name.to_string()))?;

        if !client.enabled {
            return Err(ConfigError::ClientDisabled(name.to_string()));
        }

        Ok(client)
    }

    pub fn filter(&self, name: &str) -> Result<&FilterConfig, ConfigError> {
        self.filters
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFilter(name.to_string()))
    }

    /// Retention limit for a client, preferring its own setting over the global one
    pub fn retention_limit(&self, client: &ClientConfig) -> Option<usize> {
        client.torrent_retention_limit.or(self.torrent_retention_limit)
    }
}

fn invalid(setting: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        setting: setting.to_string(),
        reason: reason.to_string(),
    }
}
