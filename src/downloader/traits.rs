// Collaborator trait definitions

use std::path::Path;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{ExtractionRequest, InfoRequest, VideoInfo};

/// External media extraction engine (yt-dlp in production)
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Run one acquisition. `Ok` does not guarantee a file was written;
    /// callers must check the output location themselves.
    async fn download(&self, request: &ExtractionRequest) -> Result<(), DownloadError>;

    /// Extract metadata without downloading
    async fn extract_info(&self, request: &InfoRequest) -> Result<VideoInfo, DownloadError>;

    /// Lightweight reachability check used for credential probing
    async fn probe(&self, request: &InfoRequest) -> Result<(), DownloadError>;
}

/// Local transcoder that derives an audio track from a video file
#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drop the video stream and encode audio into `output`
    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), DownloadError>;
}
