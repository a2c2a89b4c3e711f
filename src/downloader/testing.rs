// In-process collaborator fakes shared by unit tests

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{ExtractionRequest, InfoRequest, MediaKind, VideoInfo};
use super::traits::{Extractor, Transcoder};

/// What a scripted download attempt does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Write the output file and report success
    Produce,
    /// Report success without writing anything
    SilentNoFile,
    /// Report an error
    Fail,
}

/// Scripted extractor: each media kind pops outcomes in order, repeating the
/// last one once the script runs out
#[derive(Default)]
pub struct FakeExtractor {
    scripts: Mutex<HashMap<MediaKind, VecDeque<Outcome>>>,
    calls: Mutex<Vec<(MediaKind, String, PathBuf)>>,
    probe_result: Mutex<Option<Result<(), DownloadError>>>,
    probes: Mutex<Vec<InfoRequest>>,
    info: Mutex<Option<VideoInfo>>,
    delay: Option<Duration>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, kind: MediaKind, outcomes: &[Outcome]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(kind, outcomes.iter().copied().collect());
        self
    }

    pub fn with_probe(self, result: Result<(), DownloadError>) -> Self {
        *self.probe_result.lock().unwrap() = Some(result);
        self
    }

    pub fn with_info(self, info: VideoInfo) -> Self {
        *self.info.lock().unwrap() = Some(info);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(MediaKind, String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, kind: MediaKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _, _)| *k == kind).count()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }

    fn next_outcome(&self, kind: MediaKind) -> Outcome {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(kind).or_default();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Outcome::Fail)
        } else {
            queue.front().copied().unwrap_or(Outcome::Fail)
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn download(&self, request: &ExtractionRequest) -> Result<(), DownloadError> {
        let kind = if request.options.audio.is_some() {
            MediaKind::Audio
        } else {
            MediaKind::Video
        };
        self.calls
            .lock()
            .unwrap()
            .push((kind, request.url.clone(), request.output_template.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_outcome(kind) {
            Outcome::Produce => {
                let ext = match kind {
                    MediaKind::Video => "mp4",
                    MediaKind::Audio => "mp3",
                };
                let path = request
                    .output_template
                    .to_string_lossy()
                    .replace("%(ext)s", ext);
                tokio::fs::write(&path, b"media").await?;
                Ok(())
            }
            Outcome::SilentNoFile => Ok(()),
            Outcome::Fail => Err(DownloadError::Unknown("scripted failure".to_string())),
        }
    }

    async fn extract_info(&self, request: &InfoRequest) -> Result<VideoInfo, DownloadError> {
        match self.info.lock().unwrap().clone() {
            Some(mut info) => {
                if info.webpage_url.is_empty() {
                    info.webpage_url = request.url.clone();
                }
                Ok(info)
            }
            None => Err(DownloadError::Unknown("no info scripted".to_string())),
        }
    }

    async fn probe(&self, request: &InfoRequest) -> Result<(), DownloadError> {
        self.probes.lock().unwrap().push(request.clone());
        self.probe_result.lock().unwrap().clone().unwrap_or(Ok(()))
    }
}

/// Transcoder that copies bytes, or fails on demand
pub struct FakeTranscoder {
    succeed: bool,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeTranscoder {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &'static str {
        "fake-transcoder"
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), DownloadError> {
        self.calls
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf()));
        if !self.succeed {
            return Err(DownloadError::TranscodeFailed("scripted failure".to_string()));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}
