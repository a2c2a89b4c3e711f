// Orchestrator with fallback logic
//
// One call runs at most a handful of acquisition attempts, each writing to
// `<kind>_<id><suffix>.<ext>` in the output directory. Success is decided by
// finding that file on disk, never by the collaborator's exit status alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::diagnostics::diagnose_error;
use super::errors::DownloadError;
use super::models::{
    AcquisitionResult, DownloadIntent, ExtractionOptions, ExtractionRequest, InfoRequest, MediaKind,
    PlatformOverlay, VideoInfo,
};
use super::platform::{self, Platform};
use super::short_link::ShortLinkResolver;
use super::traits::{Extractor, Transcoder};
use super::utils::{find_output_file, short_id};

const SHORT_LINK_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_SUFFIX: &str = "_retry";
const EMERGENCY_SUFFIX: &str = "_emergency";

/// A URL after short-link expansion and platform lookup
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub original_url: String,
    pub url: String,
    pub platform: Platform,
    pub overlay: PlatformOverlay,
}

pub struct Downloader {
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    short_links: ShortLinkResolver,
    output_dir: PathBuf,
}

impl Downloader {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            transcoder,
            short_links: ShortLinkResolver::new(SHORT_LINK_TIMEOUT),
            output_dir: output_dir.into(),
        }
    }

    pub fn with_short_links(mut self, resolver: ShortLinkResolver) -> Self {
        self.short_links = resolver;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// Expand short links, then pick the platform strategy
    pub async fn resolve_target(&self, url: &str) -> ResolvedTarget {
        let resolved = self.short_links.resolve(url).await;
        let (platform, overlay) = platform::resolve(&resolved);
        info!("[Downloader] Platform: {} ({})", platform, resolved);
        ResolvedTarget {
            original_url: url.to_string(),
            url: resolved,
            platform,
            overlay,
        }
    }

    /// Resolve the intent's URL and run the fallback matrix
    pub async fn acquire(
        &self,
        intent: &DownloadIntent,
        cookies: Option<&Path>,
    ) -> Result<AcquisitionResult, DownloadError> {
        intent.validate()?;
        let target = self.resolve_target(&intent.url).await;
        self.acquire_target(&target, intent, cookies).await
    }

    /// Run the fallback matrix against an already resolved target
    pub async fn acquire_target(
        &self,
        target: &ResolvedTarget,
        intent: &DownloadIntent,
        cookies: Option<&Path>,
    ) -> Result<AcquisitionResult, DownloadError> {
        intent.validate()?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let session = Session {
            downloader: self,
            target,
            cookies,
            id: short_id(),
        };
        info!(
            "[Downloader] Acquiring {} (video: {}, audio: {}, id: {})",
            target.url, intent.want_video, intent.want_audio, session.id
        );

        let result = match (intent.want_video, intent.want_audio) {
            (true, true) => session.parallel().await?,
            (true, false) => session.video_only().await?,
            (false, true) => session.audio_only().await?,
            (false, false) => return Err(DownloadError::InvalidIntent),
        };

        info!("[Downloader] ✓ Produced: {:?}", result.kinds());
        Ok(result)
    }

    /// Info-only extraction for a URL
    pub async fn get_info(
        &self,
        target: &ResolvedTarget,
        cookies: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<VideoInfo, DownloadError> {
        let request = InfoRequest {
            url: target.url.clone(),
            options: ExtractionOptions::base().with_overlay(&target.overlay),
            cookies: cookies.map(Path::to_path_buf),
            timeout,
            flat: false,
        };
        self.extractor.extract_info(&request).await
    }
}

/// State for one orchestration call
struct Session<'a> {
    downloader: &'a Downloader,
    target: &'a ResolvedTarget,
    cookies: Option<&'a Path>,
    id: String,
}

impl Session<'_> {
    fn stem(&self, kind: MediaKind, suffix: &str) -> String {
        format!("{}_{}{}", kind, self.id, suffix)
    }

    /// One acquisition attempt; `None` when no file was produced
    async fn attempt(&self, kind: MediaKind, suffix: &str) -> Option<PathBuf> {
        let dir = &self.downloader.output_dir;
        let stem = self.stem(kind, suffix);
        let request = ExtractionRequest {
            url: self.target.url.clone(),
            options: ExtractionOptions::for_kind(kind).with_overlay(&self.target.overlay),
            output_template: dir.join(format!("{}.%(ext)s", stem)),
            cookies: self.cookies.map(Path::to_path_buf),
        };

        info!(
            "[Downloader] Trying {} with {} ({})",
            kind,
            self.downloader.extractor.name(),
            stem
        );

        if let Err(e) = self.downloader.extractor.download(&request).await {
            let reason = diagnose_error(&e.to_string())
                .map(|r| r.description())
                .unwrap_or("unknown failure");
            warn!("[Downloader] ✗ {} attempt failed ({}): {}", kind, reason, e);
            return None;
        }

        match find_output_file(dir, &stem, kind.extensions()).await {
            Some(path) => {
                info!("[Downloader] ✓ {} ready: {}", kind, path.display());
                Some(path)
            }
            None => {
                warn!(
                    "[Downloader] ✗ {} attempt reported success but no file exists for {}",
                    kind, stem
                );
                None
            }
        }
    }

    /// Derive audio from a downloaded video; `None` on failure
    async fn derive_audio(&self, video: &Path, suffix: &str) -> Option<PathBuf> {
        let output = self
            .downloader
            .output_dir
            .join(format!("{}.mp3", self.stem(MediaKind::Audio, suffix)));

        info!("[Downloader] Extracting audio from {}", video.display());

        if let Err(e) = self.downloader.transcoder.extract_audio(video, &output).await {
            warn!("[Downloader] ✗ Audio extraction failed: {}", e);
            return None;
        }

        if tokio::fs::metadata(&output).await.is_ok() {
            Some(output)
        } else {
            warn!("[Downloader] ✗ Audio extraction produced no file");
            None
        }
    }

    async fn parallel(&self) -> Result<AcquisitionResult, DownloadError> {
        let (video, audio) = tokio::join!(
            self.attempt(MediaKind::Video, ""),
            self.attempt(MediaKind::Audio, "")
        );

        let mut result = AcquisitionResult::default();

        match (video, audio) {
            (Some(video), Some(audio)) => {
                result.insert(MediaKind::Video, video);
                result.insert(MediaKind::Audio, audio);
            }
            (Some(video), None) => {
                info!("[Downloader] Audio leg failed, deriving audio from video");
                if let Some(audio) = self.derive_audio(&video, "").await {
                    result.insert(MediaKind::Audio, audio);
                }
                result.insert(MediaKind::Video, video);
            }
            (None, Some(audio)) => {
                info!("[Downloader] Video leg failed, retrying once");
                if let Some(video) = self.attempt(MediaKind::Video, RETRY_SUFFIX).await {
                    result.insert(MediaKind::Video, video);
                }
                result.insert(MediaKind::Audio, audio);
            }
            (None, None) => {
                warn!("[Downloader] Both legs failed, trying emergency video download");
                let video = self
                    .attempt(MediaKind::Video, EMERGENCY_SUFFIX)
                    .await
                    .ok_or_else(|| self.exhausted())?;
                if let Some(audio) = self.derive_audio(&video, EMERGENCY_SUFFIX).await {
                    result.insert(MediaKind::Audio, audio);
                }
                result.insert(MediaKind::Video, video);
            }
        }

        Ok(result)
    }

    async fn video_only(&self) -> Result<AcquisitionResult, DownloadError> {
        let video = match self.attempt(MediaKind::Video, "").await {
            Some(path) => path,
            None => self
                .attempt(MediaKind::Video, RETRY_SUFFIX)
                .await
                .ok_or_else(|| self.exhausted())?,
        };

        let mut result = AcquisitionResult::default();
        result.insert(MediaKind::Video, video);
        Ok(result)
    }

    async fn audio_only(&self) -> Result<AcquisitionResult, DownloadError> {
        let mut result = AcquisitionResult::default();

        if let Some(audio) = self.attempt(MediaKind::Audio, "").await {
            result.insert(MediaKind::Audio, audio);
            return Ok(result);
        }

        info!("[Downloader] Direct audio failed, sourcing audio from a video download");
        let video = self
            .attempt(MediaKind::Video, "")
            .await
            .ok_or_else(|| self.exhausted())?;

        let audio = self.derive_audio(&video, "").await;

        if let Err(e) = tokio::fs::remove_file(&video).await {
            warn!(
                "[Downloader] Failed to delete intermediate video {}: {}",
                video.display(),
                e
            );
        }

        let audio = audio.ok_or_else(|| self.exhausted())?;
        result.insert(MediaKind::Audio, audio);
        Ok(result)
    }

    fn exhausted(&self) -> DownloadError {
        error!("[Downloader] ✗ All attempts failed for {}", self.target.url);
        DownloadError::Exhausted(format!(
            "all download attempts failed for {}",
            self.target.original_url
        ))
    }
}
