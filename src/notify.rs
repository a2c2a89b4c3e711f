// Notification dispatcher
//
// Fans a message out to the process log, an append-only file and a webhook.
// Delivery is best-effort: every failure is logged and swallowed, and the
// webhook POST runs as a detached task with no delivery guarantee.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::credentials::config::{NotificationMethod, NotificationSettings};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const WEBHOOK_TITLE: &str = "Media downloader - credential notice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[serde(alias = "INFO", alias = "Info")]
    Info,
    #[serde(alias = "WARNING", alias = "Warning", alias = "warn", alias = "WARN")]
    Warning,
    #[serde(alias = "ERROR", alias = "Error")]
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Info => "🔵",
            Self::Warning => "🟡",
            Self::Error => "🔴",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatched message; not retained after delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub level: NotificationLevel,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl NotificationEvent {
    pub fn new(message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn timestamp_text(&self) -> String {
        self.timestamp
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string())
    }

    /// `[YYYY-MM-DD HH:MM:SS] LEVEL: message`
    pub fn file_line(&self) -> String {
        format!("[{}] {}: {}", self.timestamp_text(), self.level, self.message)
    }

    pub fn webhook_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "msgtype": "text",
            "text": {
                "content": format!(
                    "{} {}\n\n{}\n\nTime: {}",
                    self.level.icon(),
                    WEBHOOK_TITLE,
                    self.message,
                    self.timestamp_text()
                )
            }
        })
    }
}

pub struct Notifier {
    settings: RwLock<NotificationSettings>,
    file_path: PathBuf,
    client: Option<reqwest::Client>,
}

impl Notifier {
    /// `dir` is where the notification file lives (the cookies directory)
    pub fn new(settings: NotificationSettings, dir: &Path) -> Self {
        let file_path = dir.join(&settings.notification_file);
        let client = match reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("[Notify] Failed to build HTTP client, webhook disabled: {}", e);
                None
            }
        };

        Self {
            settings: RwLock::new(settings),
            file_path,
            client,
        }
    }

    pub fn settings(&self) -> NotificationSettings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.settings().webhook().map(str::to_string)
    }

    pub fn set_webhook_url(&self, url: Option<String>) {
        let mut guard = match self.settings.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.webhook_url = url;
    }

    /// Dispatch to every enabled sink. Never fails and never waits on the webhook.
    pub fn notify(&self, message: &str, level: NotificationLevel) {
        let settings = self.settings();
        if !settings.enabled {
            return;
        }

        let event = NotificationEvent::new(message, level);

        if settings.has_method(NotificationMethod::Log) && level >= settings.log_level {
            match level {
                NotificationLevel::Error => error!("[Notify] {}", event.message),
                NotificationLevel::Warning => warn!("[Notify] {}", event.message),
                NotificationLevel::Info => info!("[Notify] {}", event.message),
            }
        }

        if settings.has_method(NotificationMethod::File) {
            if let Err(e) = self.append_line(&event.file_line()) {
                error!(
                    "[Notify] Failed to write notification file {}: {}",
                    self.file_path.display(),
                    e
                );
            }
        }

        if settings.has_method(NotificationMethod::Webhook) {
            if let Some(url) = settings.webhook() {
                self.spawn_webhook(url.to_string(), event);
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)
    }

    fn spawn_webhook(&self, url: String, event: NotificationEvent) {
        let Some(client) = self.client.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("[Notify] No async runtime, webhook notification skipped");
            return;
        };
        handle.spawn(async move {
            send_webhook(&client, &url, &event).await;
        });
    }

    /// Deliver to the webhook and wait for the outcome; used by explicit tests
    pub async fn send_webhook_now(&self, message: &str, level: NotificationLevel) -> bool {
        let (Some(client), Some(url)) = (self.client.as_ref(), self.webhook_url()) else {
            return false;
        };
        send_webhook(client, &url, &NotificationEvent::new(message, level)).await
    }
}

async fn send_webhook(client: &reqwest::Client, url: &str, event: &NotificationEvent) -> bool {
    match client.post(url).json(&event.webhook_payload()).send().await {
        Ok(response) if response.status().is_success() => {
            info!("[Notify] Webhook notification delivered");
            true
        }
        Ok(response) => {
            error!("[Notify] Webhook notification rejected: {}", response.status());
            false
        }
        Err(e) => {
            error!("[Notify] Webhook notification failed: {}", e);
            false
        }
    }
}
