// Credential store: per-platform cookie files and the config that describes them

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{error, info};

use super::config::{AppConfig, ConfigError, HealthCheck, PlatformConfig};
use super::normalizer;
use crate::downloader::platform::Platform;
use crate::notify::{NotificationLevel, Notifier};

pub struct CredentialStore {
    config_path: PathBuf,
    cookies_dir: PathBuf,
    config: RwLock<AppConfig>,
    notifier: Arc<Notifier>,
}

impl CredentialStore {
    /// Load the config at `config_path` (defaults when missing or broken).
    /// Cookie files live next to it.
    pub fn open(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let config = AppConfig::load_or_default(&config_path);
        Self::with_config(config, config_path)
    }

    pub fn with_config(config: AppConfig, config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let cookies_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let notifier = Arc::new(Notifier::new(config.notifications.clone(), &cookies_dir));

        Self {
            config_path,
            cookies_dir,
            config: RwLock::new(config),
            notifier,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AppConfig> {
        match self.config.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn cookies_dir(&self) -> &Path {
        &self.cookies_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> AppConfig {
        self.read().clone()
    }

    pub fn health_check(&self) -> HealthCheck {
        self.read().health_check
    }

    pub fn platform(&self, id: &str) -> Option<PlatformConfig> {
        self.read().platforms.get(id).cloned()
    }

    /// Configured platform ids, sorted alphabetically
    pub fn platform_ids(&self) -> Vec<String> {
        self.read().platforms.keys().cloned().collect()
    }

    pub fn display_name(&self, id: &str) -> String {
        self.platform(id)
            .map(|p| p.display_name(id).to_string())
            .unwrap_or_else(|| id.to_string())
    }

    /// Where the platform's cookie file should be, whether or not it exists
    pub fn cookie_file(&self, id: &str) -> Option<PathBuf> {
        let platform = self.platform(id)?;
        let file = platform.cookies_file.as_deref().map(str::trim)?;
        if file.is_empty() {
            return None;
        }
        Some(self.cookies_dir.join(file))
    }

    /// Usable cookie jar for the platform, normalized to Netscape format.
    ///
    /// `None` when nothing is configured or the file is absent; an absent
    /// required file is notified on every call.
    pub async fn path_for(&self, id: &str) -> Option<PathBuf> {
        let path = self.cookie_file(id)?;

        if tokio::fs::metadata(&path).await.is_err() {
            let required = self.platform(id).map(|p| p.required).unwrap_or(false);
            if required {
                error!(
                    "[Credentials] {} requires a cookie file: {}",
                    self.display_name(id),
                    path.display()
                );
                self.notify_missing(id, &path);
            }
            return None;
        }

        let platform = id.parse::<Platform>().unwrap_or(Platform::Generic);
        Some(normalizer::normalize(path, platform).await)
    }

    pub fn notify_missing(&self, id: &str, path: &Path) {
        let message = format!(
            "⚠️ Missing cookie file for {}: {}",
            self.display_name(id),
            path.display()
        );
        self.notifier.notify(&message, NotificationLevel::Error);
    }

    pub fn notify_issue(&self, id: &str, issue: &str) {
        let message = format!("🚨 {} cookie problem: {}", self.display_name(id), issue);
        self.notifier.notify(&message, NotificationLevel::Warning);
    }

    /// Persist a new webhook URL, switch the live dispatcher over and send a
    /// confirmation through it
    pub fn update_webhook_url(&self, url: &str) -> Result<(), ConfigError> {
        let url = url.trim().to_string();

        {
            let mut guard = match self.config.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let mut updated = guard.clone();
            updated.notifications.webhook_url = Some(url.clone());
            updated.save_atomic(&self.config_path)?;
            *guard = updated;
        }

        self.notifier.set_webhook_url(Some(url.clone()));
        info!("[Credentials] Webhook URL updated: {}", truncate(&url, 50));

        let now = OffsetDateTime::now_utc()
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .unwrap_or_default();
        self.notifier.notify(
            &format!("✅ Webhook configuration updated\nUpdated at: {}", now),
            NotificationLevel::Info,
        );
        Ok(())
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
