// In-memory job tracking on top of MediaService
//
// Each submitted intent becomes a spawned task plus a JobRecord. A URL can
// only be processed by one job at a time; the claim is released when the job
// finishes, fails or is cancelled.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::downloader::{AcquisitionResult, DownloadError, DownloadIntent, MediaKind, VideoInfo};
use crate::service::MediaService;

lazy_static::lazy_static! {
    static ref UNSAFE_CHARS_RE: Regex = Regex::new(r"[^\w\-\s]").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

const MAX_TITLE_LEN: usize = 80;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Set of URLs currently being processed
#[derive(Default)]
pub struct UrlClaims {
    // url -> claim generation
    urls: Mutex<HashMap<String, u64>>,
    next: AtomicU64,
}

impl UrlClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if the caller now owns the URL
    pub fn try_claim(&self, url: &str) -> bool {
        self.claim(url).is_some()
    }

    fn claim(&self, url: &str) -> Option<u64> {
        let mut urls = lock(&self.urls);
        if urls.contains_key(url) {
            return None;
        }
        let generation = self.next.fetch_add(1, Ordering::Relaxed);
        urls.insert(url.to_string(), generation);
        Some(generation)
    }

    pub fn release(&self, url: &str) {
        lock(&self.urls).remove(url);
    }

    /// Release only if the claim is still the one identified by `generation`
    fn release_claim(&self, url: &str, generation: u64) {
        let mut urls = lock(&self.urls);
        if urls.get(url) == Some(&generation) {
            urls.remove(url);
        }
    }

    pub fn is_claimed(&self, url: &str) -> bool {
        lock(&self.urls).contains_key(url)
    }

    pub fn len(&self) -> usize {
        lock(&self.urls).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases a URL claim when dropped, including when the job task is aborted
struct ClaimGuard {
    claims: Arc<UrlClaims>,
    url: String,
    generation: u64,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.release_claim(&self.url, self.generation);
    }
}

type TaskTable = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Forgets a job's task handle when the task ends or is aborted
struct TaskGuard {
    tasks: TaskTable,
    id: String,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        lock(&self.tasks).remove(&self.id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub message: String,
    pub url: String,
    pub want_video: bool,
    pub want_audio: bool,
    pub files: BTreeMap<MediaKind, PathBuf>,
    pub video_info: Option<VideoInfo>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl JobRecord {
    fn new(id: String, intent: &DownloadIntent) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            progress: 0,
            message: "Starting...".to_string(),
            url: intent.url.clone(),
            want_video: intent.want_video,
            want_audio: intent.want_audio,
            files: BTreeMap::new(),
            video_info: None,
            error: None,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
        }
    }
}

type JobTable = Arc<Mutex<HashMap<String, JobRecord>>>;

pub struct JobManager {
    service: Arc<MediaService>,
    jobs: JobTable,
    tasks: TaskTable,
    claims: Arc<UrlClaims>,
}

impl JobManager {
    pub fn new(service: Arc<MediaService>) -> Self {
        Self {
            service,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            claims: Arc::new(UrlClaims::new()),
        }
    }

    pub fn claims(&self) -> &Arc<UrlClaims> {
        &self.claims
    }

    /// Start a job for `intent` and return its id. A URL that is already
    /// being processed returns the id of the job handling it.
    pub fn submit(&self, intent: DownloadIntent) -> Result<String, DownloadError> {
        intent.validate()?;

        let Some(generation) = self.claims.claim(&intent.url) else {
            let existing = lock(&self.jobs)
                .values()
                .find(|job| job.url == intent.url && job.status == JobStatus::Processing)
                .map(|job| job.id.clone());
            return match existing {
                Some(id) => {
                    info!("[Jobs] {} is already being processed by {}", intent.url, id);
                    Ok(id)
                }
                None => Err(DownloadError::ExecutionError(format!(
                    "{} is already being processed",
                    intent.url
                ))),
            };
        };

        let id = uuid::Uuid::new_v4().to_string();
        lock(&self.jobs).insert(id.clone(), JobRecord::new(id.clone(), &intent));

        let guard = ClaimGuard {
            claims: self.claims.clone(),
            url: intent.url.clone(),
            generation,
        };
        let task_guard = TaskGuard {
            tasks: self.tasks.clone(),
            id: id.clone(),
        };

        let handle = tokio::spawn(run_job(
            self.service.clone(),
            self.jobs.clone(),
            id.clone(),
            intent,
            (guard, task_guard),
        ));

        // a job can finish before its handle lands here; drop such leftovers
        let mut tasks = lock(&self.tasks);
        tasks.retain(|_, handle| !handle.is_finished());
        tasks.insert(id.clone(), handle);
        drop(tasks);

        info!("[Jobs] Created job {}", id);
        Ok(id)
    }

    pub fn status(&self, id: &str) -> Option<JobRecord> {
        lock(&self.jobs).get(id).cloned()
    }

    /// Every known job, oldest first
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = lock(&self.jobs).values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn active_count(&self) -> usize {
        lock(&self.tasks).values().filter(|h| !h.is_finished()).count()
    }

    /// Abort a job (killing any running collaborator process) and forget it.
    /// Returns `false` for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        let handle = lock(&self.tasks).remove(id);
        if let Some(handle) = handle {
            if !handle.is_finished() {
                handle.abort();
                info!("[Jobs] Cancelled job {}", id);
            }
        }

        let Some(job) = lock(&self.jobs).remove(id) else {
            return false;
        };
        if job.status == JobStatus::Processing {
            self.claims.release(&job.url);
        }
        true
    }
}

fn update(jobs: &JobTable, id: &str, apply: impl FnOnce(&mut JobRecord)) {
    if let Some(job) = lock(jobs).get_mut(id) {
        apply(job);
    }
}

async fn run_job(
    service: Arc<MediaService>,
    jobs: JobTable,
    id: String,
    intent: DownloadIntent,
    _guards: (ClaimGuard, TaskGuard),
) {
    update(&jobs, &id, |job| {
        job.progress = 10;
        job.message = "Fetching video info...".to_string();
    });

    let info = match service.get_info(&intent.url).await {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("[Jobs] {}: info extraction failed, continuing: {}", id, e);
            None
        }
    };

    update(&jobs, &id, |job| {
        job.progress = 20;
        job.message = "Downloading...".to_string();
        job.video_info = info.clone();
    });

    match service.acquire(&intent).await {
        Ok(result) => {
            let title = info.as_ref().map(|i| i.title.as_str()).unwrap_or("video");
            let files = rename_outputs(result, title, &id).await;
            info!("[Jobs] Job {} completed", id);
            update(&jobs, &id, |job| {
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.message = "Done".to_string();
                job.files = files;
                job.completed_at = Some(OffsetDateTime::now_utc());
            });
        }
        Err(e) => {
            error!("[Jobs] Job {} failed: {}", id, e);
            update(&jobs, &id, |job| {
                job.status = JobStatus::Error;
                job.message = format!("Failed: {}", e);
                job.error = Some(e.to_string());
                job.completed_at = Some(OffsetDateTime::now_utc());
            });
        }
    }
}

/// Give produced files user-facing names: `<kind>_<title>_<id6><ext>`
async fn rename_outputs(
    result: AcquisitionResult,
    title: &str,
    job_id: &str,
) -> BTreeMap<MediaKind, PathBuf> {
    let short: String = job_id.chars().filter(|c| *c != '-').take(6).collect();
    let safe_title = sanitize_title(title);
    let mut files = BTreeMap::new();

    for (kind, path) in result.into_files() {
        let target = renamed_path(&path, kind, &safe_title, &short);
        match tokio::fs::rename(&path, &target).await {
            Ok(()) => {
                files.insert(kind, target);
            }
            Err(e) => {
                warn!("[Jobs] Failed to rename {}: {}", path.display(), e);
                files.insert(kind, path);
            }
        }
    }

    files
}

fn renamed_path(path: &Path, kind: MediaKind, safe_title: &str, short: &str) -> PathBuf {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{}_{}_{}{}", kind, safe_title, short, ext))
}

/// Turn a video title into a safe file name fragment
pub fn sanitize_title(title: &str) -> String {
    if title.is_empty() {
        return "untitled".to_string();
    }
    let cleaned = UNSAFE_CHARS_RE.replace_all(title, "");
    let joined = WHITESPACE_RE.replace_all(&cleaned, "_");
    let trimmed: String = joined
        .trim_matches(|c| c == '.' || c == '_' || c == '-')
        .chars()
        .take(MAX_TITLE_LEN)
        .collect();

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::config::{AppConfig, NotificationMethod, NotificationSettings};
    use crate::credentials::CredentialStore;
    use crate::downloader::testing::{FakeExtractor, FakeTranscoder, Outcome};
    use crate::downloader::Downloader;
    use std::time::Duration;

    const URL: &str = "https://www.bilibili.com/video/BV1xx411c7mD";

    fn manager(dir: &Path, extractor: FakeExtractor) -> JobManager {
        let downloader = Downloader::new(
            Arc::new(extractor),
            Arc::new(FakeTranscoder::succeeding()),
            dir.join("out"),
        );
        let config = AppConfig {
            notifications: NotificationSettings {
                methods: vec![NotificationMethod::File],
                ..NotificationSettings::default()
            },
            ..AppConfig::default()
        };
        let store = Arc::new(CredentialStore::with_config(config, dir.join("cookies/config.yaml")));
        JobManager::new(Arc::new(MediaService::from_parts(downloader, store)))
    }

    async fn wait_done(manager: &JobManager, id: &str) -> JobRecord {
        for _ in 0..200 {
            let job = manager.status(id).unwrap();
            if job.status != JobStatus::Processing {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", id);
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Hello, World! (Live)"), "Hello_World_Live");
        assert_eq!(sanitize_title("  --spaced   out--  "), "spaced_out");
        assert_eq!(sanitize_title("中文 标题"), "中文_标题");
        assert_eq!(sanitize_title("!!!"), "untitled");
        assert_eq!(sanitize_title(""), "untitled");
        assert_eq!(sanitize_title(&"a".repeat(200)).len(), 80);
    }

    #[test]
    fn test_url_claims() {
        let claims = UrlClaims::new();
        assert!(claims.try_claim("u"));
        assert!(!claims.try_claim("u"));
        assert!(claims.is_claimed("u"));
        claims.release("u");
        assert!(claims.try_claim("u"));
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_renamed_path() {
        let path = renamed_path(
            Path::new("/tmp/out/audio_ab12cd34.mp3"),
            MediaKind::Audio,
            "Clip",
            "a1b2c3",
        );
        assert_eq!(path, PathBuf::from("/tmp/out/audio_Clip_a1b2c3.mp3"));
    }

    #[tokio::test]
    async fn test_job_completes_and_renames_files() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new()
            .script(MediaKind::Video, &[Outcome::Produce])
            .script(MediaKind::Audio, &[Outcome::Produce])
            .with_info(VideoInfo {
                title: "My Clip!".to_string(),
                ..VideoInfo::default()
            });
        let manager = manager(dir.path(), fake);

        let id = manager.submit(DownloadIntent::new(URL, true, true)).unwrap();
        let job = wait_done(&manager, &id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert_eq!(job.video_info.unwrap().title, "My Clip!");

        let short: String = id.replace('-', "")[..6].to_string();
        let video = &job.files[&MediaKind::Video];
        assert_eq!(
            video.file_name().unwrap().to_string_lossy(),
            format!("video_My_Clip_{}.mp4", short)
        );
        assert!(video.exists());
        assert!(job.files[&MediaKind::Audio].exists());
        assert!(!manager.claims().is_claimed(URL));
    }

    #[tokio::test]
    async fn test_info_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new().script(MediaKind::Audio, &[Outcome::Produce]);
        let manager = manager(dir.path(), fake);

        let id = manager.submit(DownloadIntent::new(URL, false, true)).unwrap();
        let job = wait_done(&manager, &id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.video_info.is_none());
        let name = job.files[&MediaKind::Audio].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("audio_video_"));
    }

    #[tokio::test]
    async fn test_failed_job_records_error_and_releases_claim() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new().script(MediaKind::Video, &[Outcome::Fail]);
        let manager = manager(dir.path(), fake);

        let id = manager.submit(DownloadIntent::new(URL, true, false)).unwrap();
        let job = wait_done(&manager, &id).await;

        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().contains("No file could be produced"));
        assert!(!manager.claims().is_claimed(URL));
    }

    #[tokio::test]
    async fn test_invalid_intent_is_rejected_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), FakeExtractor::new());

        let err = manager.submit(DownloadIntent::new(URL, false, false)).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidIntent));
        assert!(manager.list().is_empty());
        assert!(manager.claims().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_url_returns_existing_job() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new()
            .script(MediaKind::Video, &[Outcome::Produce])
            .with_delay(Duration::from_millis(300));
        let manager = manager(dir.path(), fake);

        let first = manager.submit(DownloadIntent::new(URL, true, false)).unwrap();
        let second = manager.submit(DownloadIntent::new(URL, true, false)).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.list().len(), 1);

        wait_done(&manager, &first).await;
    }

    #[tokio::test]
    async fn test_finished_jobs_leave_no_task_handles() {
        let dir = tempfile::tempdir().unwrap();
        let fake =
            FakeExtractor::new().script(MediaKind::Video, &[Outcome::Produce, Outcome::Fail]);
        let manager = manager(dir.path(), fake);

        let mut ids = Vec::new();
        for i in 0..20 {
            let url = format!("{}?p={}", URL, i);
            ids.push(manager.submit(DownloadIntent::new(&url, true, false)).unwrap());
        }
        for id in &ids {
            wait_done(&manager, id).await;
        }

        for _ in 0..200 {
            if lock(&manager.tasks).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(lock(&manager.tasks).is_empty());
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.list().len(), 20);
        assert!(manager.claims().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_and_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeExtractor::new()
            .script(MediaKind::Video, &[Outcome::Produce])
            .with_delay(Duration::from_secs(30));
        let manager = manager(dir.path(), fake);

        let id = manager.submit(DownloadIntent::new(URL, true, false)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.active_count(), 1);

        assert!(manager.cancel(&id));
        assert!(manager.status(&id).is_none());
        assert!(!manager.claims().is_claimed(URL));
        assert!(!manager.cancel(&id));

        // the URL can be submitted again, and the aborted task's late
        // cleanup does not release the new claim
        assert!(manager.claims().try_claim(URL));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.claims().is_claimed(URL));
    }
}
