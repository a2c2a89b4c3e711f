// Service facade: downloader + credential store + validator behind one API

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::credentials::config::{ConfigError, DEFAULT_CONFIG_PATH};
use crate::credentials::store::truncate;
use crate::credentials::{CredentialRecord, CredentialStore, CredentialValidator};
use crate::downloader::backends::{Ffmpeg, YtDlp};
use crate::downloader::short_link::ShortLinkResolver;
use crate::downloader::{AcquisitionResult, DownloadError, DownloadIntent, Downloader, VideoInfo};
use crate::notify::NotificationLevel;

const TEST_MESSAGE: &str = "🧪 Test message: webhook notifications are working";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub output_dir: PathBuf,
    pub config_path: PathBuf,
    /// Explicit yt-dlp binary; discovered when `None`
    pub ytdlp_path: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub short_link_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let output_dir = dirs::download_dir()
            .map(|d| d.join("media-downloader"))
            .unwrap_or_else(|| std::env::temp_dir().join("media-downloader"));

        Self {
            output_dir,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            ytdlp_path: None,
            ffmpeg_path: None,
            short_link_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of `test_webhook`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookTest {
    pub configured: bool,
    /// First 50 characters of the URL
    pub url: Option<String>,
}

pub struct MediaService {
    downloader: Arc<Downloader>,
    store: Arc<CredentialStore>,
    validator: Arc<CredentialValidator>,
}

impl MediaService {
    /// Wire up yt-dlp, ffmpeg and the credential config described by `config`
    pub fn new(config: ServiceConfig) -> Self {
        let ytdlp = match &config.ytdlp_path {
            Some(path) => YtDlp::with_binary(path.clone()),
            None => YtDlp::new(),
        };
        let ffmpeg = match &config.ffmpeg_path {
            Some(path) => Ffmpeg::with_binary(path.clone()),
            None => Ffmpeg::new(),
        };
        info!("[Service] yt-dlp: {}", ytdlp.binary_path());

        let downloader = Downloader::new(Arc::new(ytdlp), Arc::new(ffmpeg), config.output_dir)
            .with_short_links(ShortLinkResolver::new(config.short_link_timeout));
        let store = Arc::new(CredentialStore::open(config.config_path));

        Self::from_parts(downloader, store)
    }

    pub fn from_parts(downloader: Downloader, store: Arc<CredentialStore>) -> Self {
        let validator = Arc::new(CredentialValidator::new(
            store.clone(),
            downloader.extractor().clone(),
        ));
        Self {
            downloader: Arc::new(downloader),
            store,
            validator,
        }
    }

    pub fn downloader(&self) -> &Arc<Downloader> {
        &self.downloader
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn validator(&self) -> &Arc<CredentialValidator> {
        &self.validator
    }

    /// Acquire the requested media kinds for a URL.
    ///
    /// A total failure schedules a background re-check of the platform's
    /// credential when `check_on_error` is on.
    pub async fn acquire(
        &self,
        intent: &DownloadIntent,
    ) -> Result<AcquisitionResult, DownloadError> {
        intent.validate()?;

        let target = self.downloader.resolve_target(&intent.url).await;
        let cookies = self.store.path_for(target.platform.as_str()).await;
        info!(
            "[Service] Using cookies: {}",
            cookies
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        let result = self
            .downloader
            .acquire_target(&target, intent, cookies.as_deref())
            .await;

        if let Err(e) = &result {
            if !e.is_user_error() && self.store.health_check().on_error() {
                let validator = self.validator.clone();
                let platform = target.platform.as_str().to_string();
                warn!("[Service] Download failed, re-checking {} cookies", platform);
                tokio::spawn(async move {
                    validator.check_and_notify(&platform).await;
                });
            }
        }

        result
    }

    pub async fn get_info(&self, url: &str) -> Result<VideoInfo, DownloadError> {
        if url.trim().is_empty() {
            return Err(DownloadError::InvalidUrl("empty URL".to_string()));
        }
        let target = self.downloader.resolve_target(url).await;
        let cookies = self.store.path_for(target.platform.as_str()).await;
        self.downloader.get_info(&target, cookies.as_deref(), None).await
    }

    pub async fn check_credential(&self, platform: &str) -> CredentialRecord {
        self.validator.check(platform).await
    }

    pub async fn check_all_credentials(&self) -> BTreeMap<String, CredentialRecord> {
        self.validator.check_all().await
    }

    pub async fn status_report(&self) -> String {
        self.validator.status_report().await
    }

    pub fn notify(&self, message: &str, level: NotificationLevel) {
        self.store.notifier().notify(message, level);
    }

    pub fn update_webhook_url(&self, url: &str) -> Result<(), ConfigError> {
        self.store.update_webhook_url(url)
    }

    /// Send a test notification through every enabled sink
    pub fn test_webhook(&self) -> WebhookTest {
        self.notify(TEST_MESSAGE, NotificationLevel::Info);
        let url = self.store.notifier().webhook_url();
        WebhookTest {
            configured: url.is_some(),
            url: url.map(|u| truncate(&u, 50)),
        }
    }

    /// Startup check and periodic loop, as enabled by `health_check`.
    /// Returns the periodic loop's handle when it was started.
    pub async fn start_background_tasks(&self) -> Option<JoinHandle<()>> {
        let health = self.store.health_check();

        if health.startup() {
            info!("[Service] Running startup cookie check");
            self.validator.check_all().await;
            for line in self.validator.status_report().await.lines() {
                info!("[Service] {}", line);
            }
        }

        if health.periodic() {
            Some(tokio::spawn(self.validator.clone().run_periodic()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::config::{AppConfig, NotificationMethod, NotificationSettings};
    use crate::downloader::testing::{FakeExtractor, FakeTranscoder, Outcome};
    use crate::downloader::MediaKind;
    use std::path::Path;

    fn service(dir: &Path, extractor: FakeExtractor, config: AppConfig) -> MediaService {
        let downloader = Downloader::new(
            Arc::new(extractor),
            Arc::new(FakeTranscoder::succeeding()),
            dir.join("out"),
        );
        let store = Arc::new(CredentialStore::with_config(
            config,
            dir.join("cookies").join("config.yaml"),
        ));
        MediaService::from_parts(downloader, store)
    }

    fn file_only_config() -> AppConfig {
        AppConfig {
            notifications: NotificationSettings {
                methods: vec![NotificationMethod::File],
                ..NotificationSettings::default()
            },
            ..AppConfig::default()
        }
    }

    fn read_notifications(service: &MediaService) -> String {
        std::fs::read_to_string(service.store().notifier().file_path()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_acquire_uses_normalized_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new().script(MediaKind::Video, &[Outcome::Produce]);
        let service = service(dir.path(), fake, file_only_config());
        std::fs::create_dir_all(dir.path().join("cookies")).unwrap();
        std::fs::write(dir.path().join("cookies/douyin.txt"), "sessionid=abc").unwrap();

        let result = service
            .acquire(&DownloadIntent::new(
                "https://www.douyin.com/video/7300000000000000001",
                true,
                false,
            ))
            .await
            .unwrap();

        assert_eq!(result.kinds(), vec![MediaKind::Video]);
        assert!(dir.path().join("cookies/douyin.netscape.txt").exists());
    }

    #[tokio::test]
    async fn test_failure_triggers_background_recheck() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new().script(MediaKind::Video, &[Outcome::Fail]);
        let service = service(dir.path(), fake, file_only_config());

        let err = service
            .acquire(&DownloadIntent::new("https://www.douyin.com/video/1", true, false))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Exhausted(_)));

        // missing-file notice from path_for, then the re-check's cookie problem
        let mut log = String::new();
        for _ in 0..50 {
            log = read_notifications(&service);
            if log.contains("cookie problem") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(log.contains("Missing cookie file"));
        assert!(log.contains("cookie problem"));
    }

    #[tokio::test]
    async fn test_invalid_intent_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), FakeExtractor::new(), file_only_config());

        let err = service
            .acquire(&DownloadIntent::new("https://www.douyin.com/video/1", false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidIntent));
        assert!(read_notifications(&service).is_empty());
    }

    #[tokio::test]
    async fn test_get_info() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new().with_info(VideoInfo {
            title: "Hello".to_string(),
            duration: 42,
            ..VideoInfo::default()
        });
        let service = service(dir.path(), fake, AppConfig::default());

        let info = service.get_info("https://www.bilibili.com/video/BV1").await.unwrap();
        assert_eq!(info.title, "Hello");
        assert_eq!(info.duration, 42);
        assert!(service.get_info("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_test_reports_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), FakeExtractor::new(), file_only_config());

        assert_eq!(
            service.test_webhook(),
            WebhookTest {
                configured: false,
                url: None
            }
        );

        let long = format!("https://hooks.example.com/{}", "k".repeat(60));
        service.update_webhook_url(&long).unwrap();
        let outcome = service.test_webhook();
        assert!(outcome.configured);
        assert!(outcome.url.unwrap().ends_with("..."));
        assert!(read_notifications(&service).contains("Test message"));
    }

    #[tokio::test]
    async fn test_background_tasks_follow_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_only_config();
        config.health_check.periodic_check = false;
        let service = service(dir.path(), FakeExtractor::new(), config);

        assert!(service.start_background_tasks().await.is_none());
        // startup check found the missing douyin file
        assert!(read_notifications(&service).contains("cookie problem"));

        let dir = tempfile::tempdir().unwrap();
        let mut config = file_only_config();
        config.health_check.enabled = false;
        let service = self::service(dir.path(), FakeExtractor::new(), config);
        assert!(service.start_background_tasks().await.is_none());
        assert!(read_notifications(&service).is_empty());
    }
}
