// Helper functions shared by backends and the orchestrator

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use super::errors::DownloadError;

/// Browser-like User-Agent for plain HTTP requests and header overlays
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Run a command and collect its output.
///
/// `limit = None` waits as long as the process runs. The child is killed when
/// the limit expires or when the returned future is dropped.
pub async fn run_output(
    program: &str,
    args: Vec<String>,
    limit: Option<Duration>,
) -> Result<Output, DownloadError> {
    debug!("[exec] {} {}", program, args.join(" "));

    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DownloadError::ToolNotFound(program.to_string())
            } else {
                DownloadError::ExecutionError(format!("Failed to start {}: {}", program, e))
            }
        })?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        DownloadError::ExecutionError(format!("Failed to capture stdout from {}", program))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        DownloadError::ExecutionError(format!("Failed to capture stderr from {}", program))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = match limit {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(DownloadError::Timeout(limit));
            }
        },
        None => child.wait().await,
    };

    let status = waited
        .map_err(|e| {
            DownloadError::ExecutionError(format!("Failed to wait for {}: {}", program, e))
        })?;
    let stdout = join_pipe(stdout_task, "stdout").await?;
    let stderr = join_pipe(stderr_task, "stderr").await?;

    Ok(Output { status, stdout, stderr })
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::ExecutionError(format!("{} task failed: {}", name, e)))?
        .map_err(|e| DownloadError::ExecutionError(format!("Failed to read {}: {}", name, e)))
}

/// Last non-empty stderr line, trimmed for log output
pub fn stderr_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let important: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("ERROR:"))
        .take(2)
        .collect();

    if !important.is_empty() {
        return important.join(" | ");
    }

    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no error output")
        .chars()
        .take(200)
        .collect()
}

/// Locate an executable: env override, then common install paths, then `which`
pub fn find_binary(name: &str, env_override: &str) -> String {
    if let Ok(path) = std::env::var(env_override) {
        if !path.trim().is_empty() {
            return path;
        }
    }

    let common_paths = [
        format!("/opt/homebrew/bin/{}", name),
        format!("/usr/local/bin/{}", name),
        format!("/usr/bin/{}", name),
    ];

    for path in common_paths {
        if Path::new(&path).exists() {
            return path;
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg(name).output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return path;
            }
        }
    }

    // Last resort: hope it's in PATH
    name.to_string()
}

/// Return `dir/<stem>.<ext>` for the first extension that exists on disk
pub async fn find_output_file(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = dir.join(format!("{}.{}", stem, ext));
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
    }
    None
}

/// Random 8-character identifier for output file names
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_is_unique_and_short() {
        let a = short_id();
        let b = short_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_stderr_summary_prefers_error_lines() {
        let stderr = b"[info] something\nERROR: HTTP Error 403: Forbidden\n[debug] tail\n";
        assert_eq!(stderr_summary(stderr), "ERROR: HTTP Error 403: Forbidden");
        assert_eq!(stderr_summary(b"first\nlast line\n\n"), "last line");
    }

    #[test]
    fn test_find_binary_env_override() {
        std::env::set_var("MEDIA_DL_TEST_BINARY", "/custom/bin/tool");
        assert_eq!(find_binary("tool", "MEDIA_DL_TEST_BINARY"), "/custom/bin/tool");
        std::env::remove_var("MEDIA_DL_TEST_BINARY");
    }

    #[tokio::test]
    async fn test_find_output_file_checks_extensions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("video_abc.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("video_abc.webm"), b"x").unwrap();

        let found = find_output_file(dir.path(), "video_abc", &["mp4", "webm", "mkv"]).await;
        assert_eq!(found, Some(dir.path().join("video_abc.webm")));
        assert!(find_output_file(dir.path(), "audio_abc", &["mp3"]).await.is_none());
    }

    #[tokio::test]
    async fn test_run_output_missing_program() {
        let result = run_output("definitely-not-a-real-binary-xyz", vec![], None).await;
        assert!(matches!(result, Err(DownloadError::ToolNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_times_out() {
        let result = run_output(
            "sleep",
            vec!["5".to_string()],
            Some(Duration::from_millis(100)),
        )
        .await;
        assert!(matches!(result, Err(DownloadError::Timeout(_))));
    }

    #[cfg(target_os = "linux")]
    fn process_gone(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            // reaped later, but already dead
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(|rest| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_run_output_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());

        let dropped = tokio::time::timeout(
            Duration::from_millis(300),
            run_output("sh", vec!["-c".to_string(), script], None),
        )
        .await;
        assert!(dropped.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        assert!(!pid.is_empty());

        let mut gone = false;
        for _ in 0..100 {
            if process_gone(&pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "child {} survived the dropped future", pid);
    }
}
