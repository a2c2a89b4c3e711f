// Failure diagnostics - classifies collaborator error text
//
// Used for two things:
// - logging a readable reason when an acquisition attempt fails
// - deciding whether a credential probe failure means the credential is bad

use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
    static ref BOT_WORD_RE: Regex = Regex::new(r"\bbots?\b").unwrap();
}

/// Reasons an extraction call can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Login / cookies required or rejected
    AuthRequired,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Captcha or automated-traffic detection
    BotDetection,

    /// HTTP 403 Forbidden without further detail
    Forbidden,

    /// Geographic restriction
    GeoBlocked,

    /// Content deleted, private or otherwise gone
    Unavailable,

    /// Network timeout or unreachable host
    NetworkTimeout,

    /// Generic/unknown failure
    Unknown,
}

/// Substrings that mark an error as authentication-related
const AUTH_PATTERNS: &[&str] = &[
    "cookie",
    "login",
    "log in",
    "sign in",
    "logged in",
    "authenticat",
    "unauthorized",
    "http error 401",
];

impl FailureReason {
    /// Whether fresh credentials could plausibly fix this
    pub fn is_auth_related(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication required or rejected",
            Self::RateLimited => "Rate limited by the remote site",
            Self::BotDetection => "Bot detection triggered",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::GeoBlocked => "Geographic restriction",
            Self::Unavailable => "Content unavailable",
            Self::NetworkTimeout => "Network timeout",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Analyze error message and return the failure reason
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    if error.trim().is_empty() {
        return None;
    }

    let lower = error.to_lowercase();

    // Auth first: a login wall often also mentions 403 or "private"
    if AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(FailureReason::AuthRequired);
    }

    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
    {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("captcha")
        || lower.contains("unusual traffic")
        || BOT_WORD_RE.is_match(&lower)
    {
        return Some(FailureReason::BotDetection);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restrict")
        || lower.contains("geo-restrict")
    {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("private video")
        || lower.contains("404")
    {
        return Some(FailureReason::Unavailable);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network unreachable")
        || lower.contains("name or service not known")
    {
        return Some(FailureReason::NetworkTimeout);
    }

    Some(FailureReason::Unknown)
}

/// True when the error text points at bad or missing credentials
pub fn is_auth_error(error: &str) -> bool {
    diagnose_error(error).is_some_and(|r| r.is_auth_related())
}
