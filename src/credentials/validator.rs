// Credential validator
//
// Decides whether a platform's cookie file is present, fresh and (where
// probing is safe) accepted by the site. Only authentication-flavored probe
// failures count against the credential; anything else is inconclusive.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::config::PlatformConfig;
use super::store::CredentialStore;
use crate::downloader::diagnostics::diagnose_error;
use crate::downloader::models::{ExtractionOptions, InfoRequest};
use crate::downloader::traits::Extractor;

/// Files older than this are treated as expired without probing
pub const STALE_AFTER: Duration = Duration::from_secs(168 * 3600);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const PASS_INTERVAL: Duration = Duration::from_secs(3600);
pub const RECOVERY_INTERVAL: Duration = Duration::from_secs(300);

/// Platforms whose anti-automation defenses make live probes meaningless
const UNPROBED_PLATFORMS: &[&str] = &["douyin"];

/// Cheap page per platform that needs no login to render
const PROBE_URLS: &[(&str, &str)] = &[
    ("bilibili", "https://www.bilibili.com/"),
    ("xiaohongshu", "https://www.xiaohongshu.com/"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    /// The live probe passed, or no credential is needed
    Valid,
    /// Present and fresh, but the probe was skipped
    Unverified,
    /// Probe failed for a reason unrelated to authentication
    Unknown,
    /// Older than the staleness threshold
    Stale,
    /// Required file is absent
    Missing,
    /// The site rejected the credential
    Rejected,
    /// The check itself failed
    Error,
}

impl Validity {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Missing | Self::Stale | Self::Rejected | Self::Error)
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Valid => "valid",
            Self::Unverified => "unverified",
            Self::Unknown => "unknown",
            Self::Stale => "stale",
            Self::Missing => "missing",
            Self::Rejected => "rejected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of checking one platform; recomputed on every check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub platform: String,
    pub exists: bool,
    pub age: Option<Duration>,
    pub validity: Validity,
    pub message: String,
}

impl CredentialRecord {
    fn new(platform: &str, exists: bool, validity: Validity, message: impl Into<String>) -> Self {
        Self {
            platform: platform.to_string(),
            exists,
            age: None,
            validity,
            message: message.into(),
        }
    }

    fn with_age(mut self, age: Duration) -> Self {
        self.age = Some(age);
        self
    }

    pub fn is_invalid(&self) -> bool {
        self.validity.is_invalid()
    }

    /// Boolean view: everything that is not positively invalid passes
    pub fn valid(&self) -> bool {
        !self.is_invalid()
    }
}

pub struct CredentialValidator {
    store: Arc<CredentialStore>,
    extractor: Arc<dyn Extractor>,
    probe_timeout: Duration,
    stale_after: Duration,
}

impl CredentialValidator {
    pub fn new(store: Arc<CredentialStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store,
            extractor,
            probe_timeout: PROBE_TIMEOUT,
            stale_after: STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Check one platform's credential
    pub async fn check(&self, id: &str) -> CredentialRecord {
        let Some(config) = self.store.platform(id) else {
            return CredentialRecord::new(id, false, Validity::Valid, "platform needs no cookies");
        };
        let Some(path) = self.store.cookie_file(id) else {
            return CredentialRecord::new(id, false, Validity::Valid, "platform needs no cookies");
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => {
                return missing_record(id, &config, &path.display().to_string());
            }
        };

        let age = match metadata.modified() {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
            Err(e) => {
                return CredentialRecord::new(
                    id,
                    true,
                    Validity::Error,
                    format!("failed to read cookie file age: {}", e),
                );
            }
        };

        if age > self.stale_after {
            let hours = age.as_secs_f64() / 3600.0;
            return CredentialRecord::new(
                id,
                true,
                Validity::Stale,
                format!("cookie file possibly expired (stale, {:.1} hours old)", hours),
            )
            .with_age(age);
        }

        let cookies = self.store.path_for(id).await.unwrap_or(path);

        if UNPROBED_PLATFORMS.contains(&id) {
            return CredentialRecord::new(
                id,
                true,
                Validity::Unverified,
                "cookie file present (online check skipped)",
            )
            .with_age(age);
        }

        let Some(probe_url) = probe_url(id) else {
            return CredentialRecord::new(id, true, Validity::Unverified, "no probe configured")
                .with_age(age);
        };

        let request = InfoRequest {
            url: probe_url.to_string(),
            options: ExtractionOptions::base(),
            cookies: Some(cookies),
            timeout: Some(self.probe_timeout),
            flat: true,
        };

        let record = match self.extractor.probe(&request).await {
            Ok(()) => CredentialRecord::new(id, true, Validity::Valid, "cookies valid"),
            Err(e) => {
                let text = e.to_string();
                match diagnose_error(&text) {
                    Some(reason) if reason.is_auth_related() => CredentialRecord::new(
                        id,
                        true,
                        Validity::Rejected,
                        format!("cookies invalid or expired: {}", text),
                    ),
                    _ => CredentialRecord::new(
                        id,
                        true,
                        Validity::Unknown,
                        format!("could not confirm cookie status (downloads unaffected): {}", text),
                    ),
                }
            }
        };
        record.with_age(age)
    }

    /// Check every configured platform, notifying on each invalid result
    pub async fn check_all(&self) -> BTreeMap<String, CredentialRecord> {
        let mut results = BTreeMap::new();

        for id in self.store.platform_ids() {
            let record = self.check(&id).await;
            if record.is_invalid() {
                self.store.notify_issue(&id, &record.message);
            }
            results.insert(id, record);
        }

        results
    }

    /// Check one platform and notify if it is invalid
    pub async fn check_and_notify(&self, id: &str) -> CredentialRecord {
        let record = self.check(id).await;
        if record.is_invalid() {
            self.store.notify_issue(id, &record.message);
        }
        record
    }

    /// Human-readable summary of every configured platform
    pub async fn status_report(&self) -> String {
        let mut lines = vec!["📊 Cookie status report".to_string(), "=".repeat(40)];

        for id in self.store.platform_ids() {
            let Some(config) = self.store.platform(&id) else {
                continue;
            };
            let record = self.check(&id).await;
            let icon = if record.valid() { "✅" } else { "❌" };
            let required = if config.required { "required" } else { "optional" };
            lines.push(format!(
                "{} {} ({}): {}",
                icon,
                config.display_name(&id),
                required,
                record.message
            ));
        }

        lines.join("\n")
    }

    /// One pass of the periodic loop: check platforms whose interval elapsed
    async fn periodic_pass(&self, last_checked: &mut HashMap<String, Instant>) {
        let now = Instant::now();

        for id in self.store.platform_ids() {
            let Some(config) = self.store.platform(&id) else {
                continue;
            };
            let interval = Duration::from_secs(config.check_interval);
            let due = last_checked
                .get(&id)
                .map_or(true, |last| now.duration_since(*last) >= interval);
            if !due {
                continue;
            }

            info!("[Credentials] Checking {} cookies...", config.display_name(&id));
            self.check_and_notify(&id).await;
            last_checked.insert(id, now);
        }
    }

    /// Runs forever unless periodic checks are disabled. A failing pass is
    /// retried after the short recovery interval.
    pub async fn run_periodic(self: Arc<Self>) {
        self.run_periodic_with(PASS_INTERVAL, RECOVERY_INTERVAL).await
    }

    pub async fn run_periodic_with(self: Arc<Self>, pass_interval: Duration, recovery: Duration) {
        if !self.store.health_check().periodic() {
            info!("[Credentials] Periodic cookie check disabled");
            return;
        }

        info!("[Credentials] Starting periodic cookie check");
        let mut last_checked: HashMap<String, Instant> = HashMap::new();

        loop {
            let validator = self.clone();
            let mut state = std::mem::take(&mut last_checked);
            let pass = tokio::spawn(async move {
                validator.periodic_pass(&mut state).await;
                state
            });

            match pass.await {
                Ok(state) => {
                    last_checked = state;
                    tokio::time::sleep(pass_interval).await;
                }
                Err(e) => {
                    error!("[Credentials] Periodic check failed: {}", e);
                    tokio::time::sleep(recovery).await;
                }
            }
        }
    }
}

fn missing_record(id: &str, config: &PlatformConfig, path: &str) -> CredentialRecord {
    if config.required {
        CredentialRecord::new(
            id,
            false,
            Validity::Missing,
            format!("missing required cookie file: {}", path),
        )
    } else {
        warn!("[Credentials] Optional cookie file absent for {}", id);
        CredentialRecord::new(id, false, Validity::Valid, "optional cookie file absent")
    }
}

fn probe_url(id: &str) -> Option<&'static str> {
    PROBE_URLS
        .iter()
        .find(|(platform, _)| *platform == id)
        .map(|(_, url)| *url)
}
