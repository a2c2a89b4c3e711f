pub mod credentials;
pub mod downloader;
pub mod jobs;
pub mod notify;
pub mod service;

pub use credentials::{CredentialRecord, CredentialStore, CredentialValidator, Validity};
pub use downloader::{
    AcquisitionResult, DownloadError, DownloadIntent, Downloader, MediaKind, Platform, VideoInfo,
};
pub use jobs::{JobManager, JobRecord, JobStatus, UrlClaims};
pub use notify::{NotificationEvent, NotificationLevel, Notifier};
pub use service::{MediaService, ServiceConfig, WebhookTest};
