// yt-dlp CLI backend
//
// Translates the declarative ExtractionOptions into a yt-dlp command line.
// Downloads run without a time limit; info and probe calls are bounded by
// the request's timeout.

use async_trait::async_trait;
use time::macros::format_description;
use tracing::{debug, info, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{ExtractionOptions, ExtractionRequest, InfoRequest, VideoInfo};
use crate::downloader::traits::Extractor;
use crate::downloader::utils::{find_binary, run_output, stderr_summary};

pub struct YtDlp {
    binary_path: String,
}

impl YtDlp {
    pub fn new() -> Self {
        Self {
            binary_path: find_binary("yt-dlp", "YTDLP_PATH"),
        }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary_path: path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Check if yt-dlp binary is available
    pub async fn is_available(&self) -> bool {
        match run_output(
            &self.binary_path,
            vec!["--version".to_string()],
            Some(std::time::Duration::from_secs(10)),
        )
        .await
        {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    fn option_args(options: &ExtractionOptions, cookies: Option<&std::path::Path>) -> Vec<String> {
        let mut args = Vec::new();

        if options.quiet {
            args.push("--quiet".to_string());
        }
        if options.no_warnings {
            args.push("--no-warnings".to_string());
        }
        if options.no_playlist {
            args.push("--no-playlist".to_string());
        }

        if let Some(format) = &options.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }

        for (name, value) in &options.http_headers {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        for (extractor, values) in &options.extractor_args {
            if values.is_empty() {
                continue;
            }
            let joined: Vec<String> = values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            args.push("--extractor-args".to_string());
            args.push(format!("{}:{}", extractor, joined.join(";")));
        }

        if let Some(path) = cookies {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        args
    }

    /// Build command arguments for a download
    pub fn build_download_args(request: &ExtractionRequest) -> Vec<String> {
        let mut args = Self::option_args(&request.options, request.cookies.as_deref());

        args.push("-o".to_string());
        args.push(request.output_template.to_string_lossy().to_string());

        if let Some(merge) = &request.options.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(merge.clone());
        }

        if let Some(audio) = &request.options.audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(audio.codec.clone());
            args.push("--audio-quality".to_string());
            args.push(format!("{}K", audio.quality));
        }

        args.push(request.url.clone());
        args
    }

    /// Build command arguments for info extraction / probing
    pub fn build_info_args(request: &InfoRequest) -> Vec<String> {
        let mut args = Self::option_args(&request.options, request.cookies.as_deref());
        args.push("--dump-json".to_string());
        args.push("--skip-download".to_string());
        if request.flat {
            args.push("--flat-playlist".to_string());
        }
        if let Some(limit) = request.timeout {
            args.push("--socket-timeout".to_string());
            args.push(limit.as_secs().max(1).to_string());
        }
        args.push(request.url.clone());
        args
    }

    /// Parse the first JSON document yt-dlp printed
    pub fn parse_info(stdout: &[u8], fallback_url: &str) -> Result<VideoInfo, DownloadError> {
        let text = String::from_utf8_lossy(stdout);
        let first = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| DownloadError::ParseError("yt-dlp printed no JSON".to_string()))?;
        let json: serde_json::Value = serde_json::from_str(first)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        let upload_date = json["upload_date"]
            .as_str()
            .and_then(|s| time::Date::parse(s, format_description!("[year][month][day]")).ok());

        Ok(VideoInfo {
            id: json["id"].as_str().unwrap_or("").to_string(),
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
            duration: json["duration"].as_f64().unwrap_or(0.0) as u64,
            view_count: json["view_count"].as_u64().unwrap_or(0),
            like_count: json["like_count"].as_u64().unwrap_or(0),
            description: json["description"].as_str().unwrap_or("").to_string(),
            upload_date,
            thumbnail: json["thumbnail"].as_str().unwrap_or("").to_string(),
            webpage_url: json["webpage_url"].as_str().unwrap_or(fallback_url).to_string(),
            extractor: json["extractor"].as_str().unwrap_or("").to_string(),
            format_count: json["formats"].as_array().map_or(0, |f| f.len()),
        })
    }

    async fn run_info(&self, request: &InfoRequest) -> Result<std::process::Output, DownloadError> {
        let args = Self::build_info_args(request);
        let output = run_output(&self.binary_path, args, request.timeout).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!("[yt-dlp] Info extraction failed: {}", stderr_summary(&output.stderr));
            return Err(DownloadError::from(stderr));
        }

        Ok(output)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(&self, request: &ExtractionRequest) -> Result<(), DownloadError> {
        let args = Self::build_download_args(request);
        debug!("[yt-dlp] {} {}", self.binary_path, args.join(" "));

        let output = run_output(&self.binary_path, args, None).await?;

        if output.status.success() {
            info!("[yt-dlp] Finished: {}", request.output_template.display());
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!("[yt-dlp] Download failed: {}", stderr_summary(&output.stderr));
            Err(DownloadError::from(stderr))
        }
    }

    async fn extract_info(&self, request: &InfoRequest) -> Result<VideoInfo, DownloadError> {
        let output = self.run_info(request).await?;
        Self::parse_info(&output.stdout, &request.url)
    }

    async fn probe(&self, request: &InfoRequest) -> Result<(), DownloadError> {
        self.run_info(request).await.map(|_| ())
    }
}
