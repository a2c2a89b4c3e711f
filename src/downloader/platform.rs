// Platform strategy resolution
//
// Maps a URL onto a known platform and the option overlay that works best
// for it. Matching is ordered substring search; the first hit wins.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::models::PlatformOverlay;
use super::utils::DEFAULT_USER_AGENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bilibili,
    Douyin,
    Xiaohongshu,
    Youtube,
    Tiktok,
    Generic,
}

/// Ordered domain fragments; first match wins
const DOMAIN_TABLE: &[(&str, Platform)] = &[
    ("bilibili.com", Platform::Bilibili),
    ("douyin.com", Platform::Douyin),
    ("xiaohongshu.com", Platform::Xiaohongshu),
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("tiktok.com", Platform::Tiktok),
];

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Bilibili,
        Platform::Douyin,
        Platform::Xiaohongshu,
        Platform::Youtube,
        Platform::Tiktok,
        Platform::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bilibili => "bilibili",
            Self::Douyin => "douyin",
            Self::Xiaohongshu => "xiaohongshu",
            Self::Youtube => "youtube",
            Self::Tiktok => "tiktok",
            Self::Generic => "generic",
        }
    }

    /// Identify the platform a URL belongs to
    pub fn from_url(url: &str) -> Self {
        DOMAIN_TABLE
            .iter()
            .find(|(fragment, _)| url.contains(fragment))
            .map(|(_, platform)| *platform)
            .unwrap_or(Platform::Generic)
    }

    /// Domain written into generated cookie jars
    pub fn cookie_domain(&self) -> &'static str {
        match self {
            Self::Bilibili => ".bilibili.com",
            Self::Xiaohongshu => ".xiaohongshu.com",
            Self::Youtube => ".youtube.com",
            Self::Tiktok => ".tiktok.com",
            Self::Douyin | Self::Generic => ".douyin.com",
        }
    }

    /// Format/header/extractor adjustments for this platform
    pub fn overlay(&self) -> PlatformOverlay {
        match self {
            Self::Douyin => PlatformOverlay {
                format: Some("best[height<=720]/best".to_string()),
                http_headers: douyin_headers(),
                extractor_args: BTreeMap::from([(
                    "douyin".to_string(),
                    BTreeMap::from([("api_hostname".to_string(), "www.douyin.com".to_string())]),
                )]),
            },
            Self::Bilibili => PlatformOverlay {
                format: Some(
                    "worstvideo[height>=360]+worstaudio/worstvideo+worstaudio/worst".to_string(),
                ),
                ..PlatformOverlay::default()
            },
            Self::Xiaohongshu | Self::Tiktok => PlatformOverlay {
                format: Some("best[height<=720]/best".to_string()),
                ..PlatformOverlay::default()
            },
            Self::Youtube => PlatformOverlay {
                format: Some("best[height<=1080]/best".to_string()),
                ..PlatformOverlay::default()
            },
            Self::Generic => PlatformOverlay::default(),
        }
    }
}

fn douyin_headers() -> BTreeMap<String, String> {
    [
        ("User-Agent", DEFAULT_USER_AGENT),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
        ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
        ("DNT", "1"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Cache-Control", "max-age=0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

/// Pure strategy lookup: `(platform, overlay)` for a URL
pub fn resolve(url: &str) -> (Platform, PlatformOverlay) {
    let platform = Platform::from_url(url);
    (platform, platform.overlay())
}
