// Downloader module - platform strategy, collaborator backends and the
// video/audio fallback matrix

pub mod backends;
pub mod diagnostics;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod short_link;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::DownloadError;
pub use models::{AcquisitionResult, DownloadIntent, MediaKind, VideoInfo};
pub use orchestrator::{Downloader, ResolvedTarget};
pub use platform::Platform;
pub use traits::{Extractor, Transcoder};
