// Common data models for the download engine

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Kind of media an acquisition attempt produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Extensions accepted as proof that an attempt produced a file
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Video => &["mp4", "webm", "mkv", "avi", "mov", "flv"],
            Self::Audio => &["mp3", "m4a", "wav", "aac", "ogg"],
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller wants out of a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadIntent {
    pub url: String,
    pub want_video: bool,
    pub want_audio: bool,
}

impl DownloadIntent {
    pub fn new(url: impl Into<String>, want_video: bool, want_audio: bool) -> Self {
        Self {
            url: url.into(),
            want_video,
            want_audio,
        }
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        if !self.want_video && !self.want_audio {
            return Err(DownloadError::InvalidIntent);
        }
        if self.url.trim().is_empty() {
            return Err(DownloadError::InvalidUrl("empty URL".to_string()));
        }
        Ok(())
    }
}

/// Files produced by one orchestration call, keyed by media kind.
///
/// The paths are owned by the caller once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    files: BTreeMap<MediaKind, PathBuf>,
}

impl AcquisitionResult {
    pub fn insert(&mut self, kind: MediaKind, path: PathBuf) {
        self.files.insert(kind, path);
    }

    pub fn get(&self, kind: MediaKind) -> Option<&Path> {
        self.files.get(&kind).map(PathBuf::as_path)
    }

    pub fn video(&self) -> Option<&Path> {
        self.get(MediaKind::Video)
    }

    pub fn audio(&self) -> Option<&Path> {
        self.get(MediaKind::Audio)
    }

    pub fn contains(&self, kind: MediaKind) -> bool {
        self.files.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        self.files.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> BTreeMap<MediaKind, PathBuf> {
        self.files
    }
}

/// Metadata returned by an info-only extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    /// Duration in seconds
    pub duration: u64,
    pub view_count: u64,
    pub like_count: u64,
    pub description: String,
    pub upload_date: Option<time::Date>,
    pub thumbnail: String,
    pub webpage_url: String,
    pub extractor: String,
    pub format_count: usize,
}

/// Audio post-processing requested from the collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConversion {
    pub codec: String,
    pub quality: String,
}

/// Platform-specific adjustments layered over the base options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformOverlay {
    pub format: Option<String>,
    pub http_headers: BTreeMap<String, String>,
    /// extractor name -> (argument -> value)
    pub extractor_args: BTreeMap<String, BTreeMap<String, String>>,
}

impl PlatformOverlay {
    pub fn is_empty(&self) -> bool {
        self.format.is_none() && self.http_headers.is_empty() && self.extractor_args.is_empty()
    }
}

/// Declarative option set handed to the extraction collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    pub format: Option<String>,
    pub http_headers: BTreeMap<String, String>,
    pub extractor_args: BTreeMap<String, BTreeMap<String, String>>,
    pub merge_output_format: Option<String>,
    pub audio: Option<AudioConversion>,
    pub quiet: bool,
    pub no_warnings: bool,
    pub no_playlist: bool,
}

impl ExtractionOptions {
    /// Options shared by every invocation
    pub fn base() -> Self {
        Self {
            format: None,
            http_headers: BTreeMap::new(),
            extractor_args: BTreeMap::new(),
            merge_output_format: None,
            audio: None,
            quiet: true,
            no_warnings: true,
            no_playlist: true,
        }
    }

    /// Cross-platform video selection: medium merged formats first, then
    /// split streams, then anything at all
    pub fn video() -> Self {
        Self {
            format: Some(
                [
                    "best[height<=720][filesize<100M]",
                    "worstvideo[height>=360]+worstaudio[acodec!=none]",
                    "worstvideo+worstaudio",
                    "best[height<=720]",
                    "best[height<=480]",
                    "worstvideo+bestaudio",
                    "worst",
                ]
                .join("/"),
            ),
            merge_output_format: Some("mp4".to_string()),
            ..Self::base()
        }
    }

    pub fn audio() -> Self {
        Self {
            format: Some(
                ["bestaudio[filesize<50M]", "bestaudio", "best[filesize<50M]", "best"].join("/"),
            ),
            audio: Some(AudioConversion {
                codec: "mp3".to_string(),
                quality: "192".to_string(),
            }),
            ..Self::base()
        }
    }

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::video(),
            MediaKind::Audio => Self::audio(),
        }
    }

    /// Merge a platform overlay; the overlay wins on every conflicting field
    pub fn with_overlay(mut self, overlay: &PlatformOverlay) -> Self {
        if let Some(format) = &overlay.format {
            self.format = Some(format.clone());
        }
        for (name, value) in &overlay.http_headers {
            self.http_headers.insert(name.clone(), value.clone());
        }
        for (extractor, args) in &overlay.extractor_args {
            let entry = self.extractor_args.entry(extractor.clone()).or_default();
            for (key, value) in args {
                entry.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::base()
    }
}

/// One acquisition attempt
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: String,
    pub options: ExtractionOptions,
    /// Output path with a `%(ext)s` placeholder
    pub output_template: PathBuf,
    pub cookies: Option<PathBuf>,
}

/// Info-only extraction (no download)
#[derive(Debug, Clone)]
pub struct InfoRequest {
    pub url: String,
    pub options: ExtractionOptions,
    pub cookies: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Do not resolve playlist entries
    pub flat: bool,
}
