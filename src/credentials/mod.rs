// Per-platform cookie management and health checks

pub mod config;
pub mod normalizer;
pub mod store;
pub mod validator;

pub use config::{AppConfig, ConfigError, HealthCheck, NotificationSettings, PlatformConfig};
pub use store::CredentialStore;
pub use validator::{CredentialRecord, CredentialValidator, Validity};
