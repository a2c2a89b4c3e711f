// Short-link expansion
//
// Share links like https://v.douyin.com/xxxx/ carry no video id; following
// the redirect chain recovers the canonical URL. Any failure here is
// non-fatal and hands back the original URL.

use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use super::utils::DEFAULT_USER_AGENT;

lazy_static::lazy_static! {
    static ref NUMERIC_SEGMENT_RE: Regex = Regex::new(r"/\d+/").unwrap();
}

/// A host whose links must be expanded, and the domain the result must land on
#[derive(Debug, Clone)]
pub struct ShortLinkRule {
    pub host: String,
    pub target_domain: String,
}

pub struct ShortLinkResolver {
    client: Option<reqwest::Client>,
    rules: Vec<ShortLinkRule>,
}

impl ShortLinkResolver {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build();

        let client = match client {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(
                    "[ShortLink] Failed to build HTTP client, short links stay unresolved: {}",
                    e
                );
                None
            }
        };

        Self {
            client,
            rules: vec![ShortLinkRule {
                host: "v.douyin.com".to_string(),
                target_domain: "douyin.com".to_string(),
            }],
        }
    }

    pub fn with_rule(mut self, host: impl Into<String>, target_domain: impl Into<String>) -> Self {
        self.rules.push(ShortLinkRule {
            host: host.into(),
            target_domain: target_domain.into(),
        });
        self
    }

    fn rule_for(&self, url: &str) -> Option<&ShortLinkRule> {
        self.rules.iter().find(|r| url.contains(&r.host))
    }

    pub fn is_short_link(&self, url: &str) -> bool {
        self.rule_for(url).is_some()
    }

    /// Expand `url` if it is a known short link; never fails
    pub async fn resolve(&self, url: &str) -> String {
        let Some(rule) = self.rule_for(url) else {
            return url.to_string();
        };
        let Some(client) = &self.client else {
            return url.to_string();
        };

        info!("[ShortLink] Resolving short link: {}", url);

        let final_url = match client.get(url).send().await {
            Ok(response) => response.url().to_string(),
            Err(e) => {
                warn!("[ShortLink] Resolution failed ({}), using original URL", e);
                return url.to_string();
            }
        };

        info!("[ShortLink] Redirected to: {}", final_url);

        if looks_like_content_url(&final_url, &rule.target_domain) {
            final_url
        } else {
            warn!("[ShortLink] Redirect target has no content id, using original URL");
            url.to_string()
        }
    }
}

fn looks_like_content_url(url: &str, domain: &str) -> bool {
    url.contains(domain) && (url.contains("video") || NUMERIC_SEGMENT_RE.is_match(url))
}
