//! Server log evidence
//!
//! Some server commands report their outcome only in the server log. The
//! sink returns the most recent chunk of the most relevant log as text:
//! - configured files, if any exist
//! - otherwise the newest file matching a server log name in the search dirs
//! - otherwise the systemd journal of the server unit

use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tracing::debug;
use zomboid_core::{LogSettings, MonitorError, Result};

/// File names the dedicated server writes its console log to
const LOG_NAME_PATTERNS: &[&str] = &["DebugLog-server", "server-console"];

const JOURNAL_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of recent server log text
#[async_trait]
pub trait EvidenceSink: Send + Sync + 'static {
    /// Most recent window of log text, oldest line first
    async fn recent_text(&self) -> Result<String>;
}

/// Reads the dedicated server's log files, falling back to journald
pub struct ServerLogSink {
    settings: LogSettings,
    service_name: String,
}

impl ServerLogSink {
    pub fn new(settings: LogSettings, service_name: impl Into<String>) -> Self {
        Self {
            settings,
            service_name: service_name.into(),
        }
    }

    /// Pick the log to read: the newest existing configured file, else the
    /// newest discovered one.
    pub async fn locate(&self) -> Option<PathBuf> {
        if !self.settings.files.is_empty() {
            return newest(self.settings.files.iter().cloned()).await;
        }

        let mut candidates = Vec::new();
        for dir in &self.settings.search_dirs {
            let Ok(mut entries) = fs::read_dir(dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if is_server_log_name(&name) {
                    candidates.push(entry.path());
                }
            }
        }
        newest(candidates.into_iter()).await
    }

    async fn read_journal(&self) -> Result<String> {
        let since = format!("-{}min", self.settings.journal_minutes);
        let output = tokio::time::timeout(
            JOURNAL_TIMEOUT,
            Command::new("journalctl")
                .args(["-u", &self.service_name, "--since", &since, "--no-pager", "-o", "cat"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| MonitorError::RemoteSource("journalctl timed out".to_string()))?
        .map_err(|e| MonitorError::RemoteSource(format!("journalctl failed: {}", e)))?;

        if !output.status.success() {
            return Err(MonitorError::RemoteSource(format!(
                "journalctl exited with {}",
                output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(tail_str(&text, self.settings.window_bytes as usize).to_string())
    }
}

#[async_trait]
impl EvidenceSink for ServerLogSink {
    async fn recent_text(&self) -> Result<String> {
        if let Some(path) = self.locate().await {
            debug!("Scanning server log {}", path.display());
            return read_tail(&path, self.settings.window_bytes).await;
        }

        if self.settings.use_journal {
            debug!("No server log file found, querying journal for {}", self.service_name);
            return self.read_journal().await;
        }

        Err(MonitorError::RemoteSource("no server log found".to_string()))
    }
}

fn is_server_log_name(name: &str) -> bool {
    name.ends_with(".txt") && LOG_NAME_PATTERNS.iter().any(|p| name.contains(p))
}

async fn newest(paths: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for path in paths {
        let Ok(meta) = fs::metadata(&path).await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if best.as_ref().is_none_or(|(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }
    best.map(|(_, path)| path)
}

/// Read the last `window` bytes of a file as text.
///
/// When the read starts mid-file the first, partial line is dropped.
pub async fn read_tail(path: &Path, window: u64) -> Result<String> {
    let io_err =
        |e: std::io::Error| MonitorError::RemoteSource(format!("{}: {}", path.display(), e));

    let mut file = fs::File::open(path).await.map_err(io_err)?;
    let len = file.metadata().await.map_err(io_err)?.len();
    let start = len.saturating_sub(window);
    file.seek(SeekFrom::Start(start)).await.map_err(io_err)?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf).await.map_err(io_err)?;

    let text = String::from_utf8_lossy(&buf);
    if start > 0 {
        Ok(match text.find('\n') {
            Some(i) => text[i + 1..].to_string(),
            None => String::new(),
        })
    } else {
        Ok(text.into_owned())
    }
}

/// Last `window` bytes of `text`, cut at a line boundary
fn tail_str(text: &str, window: usize) -> &str {
    if text.len() <= window {
        return text;
    }
    let mut start = text.len() - window;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find('\n') {
        Some(i) => &tail[i + 1..],
        None => "",
    }
}
