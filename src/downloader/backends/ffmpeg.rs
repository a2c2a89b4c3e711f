// ffmpeg transcoder backend

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::traits::Transcoder;
use crate::downloader::utils::{find_binary, run_output, stderr_summary};

const AUDIO_CODEC: &str = "mp3";
const AUDIO_BITRATE: &str = "192k";
const AUDIO_SAMPLE_RATE: &str = "44100";

pub struct Ffmpeg {
    binary_path: String,
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self {
            binary_path: find_binary("ffmpeg", "FFMPEG_PATH"),
        }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary_path: path.into(),
        }
    }

    pub async fn is_available(&self) -> bool {
        match run_output(
            &self.binary_path,
            vec!["-version".to_string()],
            Some(std::time::Duration::from_secs(10)),
        )
        .await
        {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    pub fn build_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-acodec".to_string(),
            AUDIO_CODEC.to_string(),
            "-ab".to_string(),
            AUDIO_BITRATE.to_string(),
            "-ar".to_string(),
            AUDIO_SAMPLE_RATE.to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
        let out = run_output(&self.binary_path, Self::build_args(input, output), None).await?;

        if !out.status.success() {
            let summary = stderr_summary(&out.stderr);
            warn!("[ffmpeg] Audio extraction failed: {}", summary);
            return Err(DownloadError::TranscodeFailed(summary));
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(DownloadError::TranscodeFailed(format!(
                "ffmpeg exited cleanly but {} is missing",
                output.display()
            )));
        }

        info!("[ffmpeg] Extracted audio: {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_drop_video_and_fix_rate() {
        let args = Ffmpeg::build_args(Path::new("/tmp/v.mp4"), Path::new("/tmp/a.mp3"));
        assert_eq!(args[1], "/tmp/v.mp4");
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert!(args.contains(&"44100".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/a.mp3");
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let ffmpeg = Ffmpeg::with_binary("no-such-ffmpeg-binary");
        let result = ffmpeg
            .extract_audio(Path::new("/tmp/in.mp4"), Path::new("/tmp/out.mp3"))
            .await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(_))));
        assert!(!ffmpeg.is_available().await);
    }
}
