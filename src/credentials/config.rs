// Credential / notification / health-check configuration (YAML)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::notify::NotificationLevel;

pub const DEFAULT_CONFIG_PATH: &str = "cookies/config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub name: String,
    /// File name relative to the cookies directory
    #[serde(default)]
    pub cookies_file: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Seconds between periodic checks
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: u32,
}

fn default_check_interval() -> u64 {
    3600
}

fn default_expiry_warning_days() -> u32 {
    3
}

impl PlatformConfig {
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        if self.name.trim().is_empty() {
            id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    Log,
    File,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_methods")]
    pub methods: Vec<NotificationMethod>,
    /// Minimum level written by the log sink
    #[serde(default = "default_log_level")]
    pub log_level: NotificationLevel,
    #[serde(default = "default_notification_file")]
    pub notification_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_methods() -> Vec<NotificationMethod> {
    vec![NotificationMethod::Log, NotificationMethod::File]
}

fn default_log_level() -> NotificationLevel {
    NotificationLevel::Warning
}

fn default_notification_file() -> String {
    "cookies_notifications.log".to_string()
}

impl NotificationSettings {
    pub fn has_method(&self, method: NotificationMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Webhook URL if one is set to a non-blank value
    pub fn webhook(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            methods: default_methods(),
            log_level: default_log_level(),
            notification_file: default_notification_file(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub startup_check: bool,
    #[serde(default = "default_true")]
    pub periodic_check: bool,
    #[serde(default = "default_true")]
    pub check_on_error: bool,
}

impl HealthCheck {
    pub fn startup(&self) -> bool {
        self.enabled && self.startup_check
    }

    pub fn periodic(&self) -> bool {
        self.enabled && self.periodic_check
    }

    pub fn on_error(&self) -> bool {
        self.enabled && self.check_on_error
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_check: true,
            periodic_check: true,
            check_on_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformConfig>,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub health_check: HealthCheck,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "douyin".to_string(),
            PlatformConfig {
                name: "Douyin".to_string(),
                cookies_file: Some("douyin.txt".to_string()),
                required: true,
                check_interval: default_check_interval(),
                expiry_warning_days: default_expiry_warning_days(),
            },
        );

        Self {
            platforms,
            notifications: NotificationSettings::default(),
            health_check: HealthCheck::default(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Strict load: any problem is an error
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config, degrading to defaults when it is missing or broken
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!("[Config] Config file not found: {}, using defaults", path.display());
            return Self::default();
        }

        match Self::try_load(path) {
            Ok(config) => {
                info!(
                    "[Config] Loaded {} platform(s) from {}",
                    config.platforms.len(),
                    path.display()
                );
                config
            }
            Err(e) => {
                error!("[Config] {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Write the config through a sibling temp file and rename it into place
    pub fn save_atomic(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        write_atomic(path, yaml.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Replace `path` with `contents` so that readers see the old or the new file, never a mix
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "config".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    std::fs::write(&tmp, contents)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
