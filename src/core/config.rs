use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::time::Duration;

use super::notifications::generators::{GeneratorConfig, LaborConfig};
use super::notifications::presenter::{FailurePolicy, MAX_BATCH};

/// Application settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// JSON snapshot exported by the indexer
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// JSON-lines file of pushed events, tailed as a subscription
    #[serde(default)]
    pub events_path: Option<PathBuf>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Account used to sign bulk actions
    #[serde(default)]
    pub account_address: String,
    #[serde(default)]
    pub generators: GeneratorConfig,
    #[serde(default)]
    pub labor: LaborConfig,
}

fn default_snapshot_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local/share/realm-watcher/snapshot.json")
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_batch() -> usize {
    MAX_BATCH
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            events_path: None,
            poll_interval_secs: default_poll_interval_secs(),
            max_batch: MAX_BATCH,
            failure_policy: FailurePolicy::default(),
            account_address: String::new(),
            generators: GeneratorConfig::default_enabled(),
            labor: LaborConfig::default(),
        }
    }
}

impl Settings {
    /// Poll interval, never shorter than one second
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring malformed {:?}: {}", self.config_path, e),
                },
                Err(e) => log::warn!("Failed to read {:?}: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
