// Cookie normalizer
//
// yt-dlp only reads Netscape cookie jars, but users usually paste the
// `name=value; name2=value2` string their browser shows. Pasted strings are
// rewritten into a sibling `<stem>.netscape.txt` jar.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::credentials::config::write_atomic;
use crate::downloader::platform::Platform;

pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";
const GENERATED_NOTICE: &str = "# This is a generated file! Do not edit.";

/// Max 32-bit epoch, i.e. never expires
const NEVER_EXPIRES: i64 = 2_147_483_647;

/// Split a browser cookie string into `(name, value)` pairs.
///
/// Empty names or values and `__`-prefixed (host-bound) cookies are dropped.
/// A repeated name keeps its first position and its last value.
pub fn parse_cookie_string(raw: &str) -> Vec<(String, String)> {
    let mut cookies: Vec<(String, String)> = Vec::new();

    for part in raw.split(';') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() || name.starts_with("__") {
            continue;
        }

        match cookies.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value.to_string(),
            None => cookies.push((name.to_string(), value.to_string())),
        }
    }

    debug!("[Cookies] Parsed {} cookie(s)", cookies.len());
    cookies
}

/// Render a Netscape jar for `cookies` on `domain`
pub fn render_netscape(domain: &str, cookies: &[(String, String)]) -> String {
    let mut out = format!("{}\n{}\n\n", NETSCAPE_HEADER, GENERATED_NOTICE);
    for (name, value) in cookies {
        out.push_str(&format!(
            "{}\tTRUE\t/\tFALSE\t{}\t{}\t{}\n",
            domain, NEVER_EXPIRES, name, value
        ));
    }
    out
}

pub fn netscape_path(path: &Path) -> PathBuf {
    path.with_extension("netscape.txt")
}

/// Return a path to a Netscape-format jar for the cookie file at `path`.
///
/// Already-canonical files come back unchanged; pasted strings are converted;
/// anything else (empty, comment-only, unreadable) is handed back as-is so
/// the collaborator can report the problem.
pub fn normalize_file(path: &Path, platform: Platform) -> PathBuf {
    let content = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!("[Cookies] Failed to read {}: {}", path.display(), e);
            return path.to_path_buf();
        }
    };
    let content = content.trim();

    if content.starts_with(NETSCAPE_HEADER) || content.is_empty() || content.starts_with('#') {
        return path.to_path_buf();
    }

    let cookies = parse_cookie_string(content);
    let target = netscape_path(path);
    let jar = render_netscape(platform.cookie_domain(), &cookies);

    match write_atomic(&target, jar.as_bytes()) {
        Ok(()) => {
            info!(
                "[Cookies] Converted {} cookie(s) from {} into {}",
                cookies.len(),
                path.display(),
                target.display()
            );
            target
        }
        Err(e) => {
            error!("[Cookies] Failed to write {}: {}", target.display(), e);
            path.to_path_buf()
        }
    }
}

/// Async wrapper running the conversion on the blocking pool
pub async fn normalize(path: PathBuf, platform: Platform) -> PathBuf {
    let fallback = path.clone();
    match tokio::task::spawn_blocking(move || normalize_file(&path, platform)).await {
        Ok(normalized) => normalized,
        Err(e) => {
            error!("[Cookies] Normalizer task failed: {}", e);
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_drops_empty_and_host_prefixed() {
        assert_eq!(
            parse_cookie_string("a=1; __host=2; b=; c=3"),
            pairs(&[("a", "1"), ("c", "3")])
        );
    }

    #[test]
    fn test_parse_splits_on_first_equals() {
        assert_eq!(
            parse_cookie_string("token=abc=def; novalue; =orphan"),
            pairs(&[("token", "abc=def")])
        );
    }

    #[test]
    fn test_parse_duplicate_keeps_last_value() {
        assert_eq!(
            parse_cookie_string("sid=old; x=1; sid=new"),
            pairs(&[("sid", "new"), ("x", "1")])
        );
    }

    #[test]
    fn test_render_lines() {
        let jar = render_netscape(".bilibili.com", &pairs(&[("SESSDATA", "xyz")]));
        assert!(jar.starts_with(NETSCAPE_HEADER));
        assert!(jar.ends_with(".bilibili.com\tTRUE\t/\tFALSE\t2147483647\tSESSDATA\txyz\n"));
    }

    #[test]
    fn test_normalize_pasted_string() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("douyin.txt");
        std::fs::write(&raw, "ttwid=1%7Cabc; __ac_nonce=zzz; sessionid=s1\n").unwrap();

        let out = normalize_file(&raw, Platform::Douyin);
        assert_eq!(out, dir.path().join("douyin.netscape.txt"));

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains(".douyin.com\tTRUE\t/\tFALSE\t2147483647\tttwid\t1%7Cabc"));
        assert!(text.contains("\tsessionid\ts1"));
        assert!(!text.contains("__ac_nonce"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("bilibili.txt");
        std::fs::write(&raw, "SESSDATA=abc; bili_jct=def").unwrap();

        let once = normalize_file(&raw, Platform::Bilibili);
        let first = std::fs::read_to_string(&once).unwrap();

        let twice = normalize_file(&once, Platform::Bilibili);
        assert_eq!(twice, once);
        assert_eq!(std::fs::read_to_string(&twice).unwrap(), first);

        // re-running on the raw file regenerates identical content
        assert_eq!(normalize_file(&raw, Platform::Bilibili), once);
        assert_eq!(std::fs::read_to_string(&once).unwrap(), first);
    }

    #[test]
    fn test_comment_only_and_missing_files_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let commented = dir.path().join("x.txt");
        std::fs::write(&commented, "# just a note\n").unwrap();
        assert_eq!(normalize_file(&commented, Platform::Generic), commented);

        let missing = dir.path().join("missing.txt");
        assert_eq!(normalize_file(&missing, Platform::Generic), missing);
    }

    #[tokio::test]
    async fn test_async_normalize() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("xiaohongshu.txt");
        std::fs::write(&raw, "a1=v1").unwrap();

        let out = normalize(raw, Platform::Xiaohongshu).await;
        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.contains(".xiaohongshu.com\tTRUE"));
    }
}
