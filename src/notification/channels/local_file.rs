//! 本地文件渠道 - 将每次汇总提醒追加到 JSONL 日志

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::notification::channel::{AlertKind, AlertSurface, SendResult, SummaryAlert};

/// 提醒日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub ts: DateTime<Utc>,
    /// "post" 或 "cancel"
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AlertKind>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub silent: bool,
}

/// 日志最多保留的条目数
pub const MAX_ALERT_LOG_ENTRIES: usize = 200;
/// 压缩后保留的条目数
pub const KEEP_AFTER_COMPACT: usize = 100;
/// 每写入多少条检查一次
const COMPACT_CHECK_INTERVAL: usize = 10;

/// 本地文件渠道
pub struct LocalFileSurface {
    path: PathBuf,
    max_entries: usize,
    keep_after_compact: usize,
    writes: AtomicUsize,
}

impl LocalFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: MAX_ALERT_LOG_ENTRIES,
            keep_after_compact: KEEP_AFTER_COMPACT,
            writes: AtomicUsize::new(0),
        }
    }

    /// 设置日志上限与压缩后保留条数
    pub fn with_limits(mut self, max_entries: usize, keep_after_compact: usize) -> Self {
        self.max_entries = max_entries;
        self.keep_after_compact = keep_after_compact.min(max_entries);
        self
    }

    /// 默认日志路径
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notification-hub")
            .join("alerts.jsonl")
    }

    /// 追加一条日志（带文件锁）
    fn append(&self, entry: &AlertLogEntry) -> Result<()> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        file.lock_exclusive()?;
        let mut file = file;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        file.unlock()?;

        self.maybe_compact();
        Ok(())
    }

    /// 定期检查日志长度
    fn maybe_compact(&self) {
        let count = self.writes.fetch_add(1, Ordering::Relaxed);
        if count % COMPACT_CHECK_INTERVAL != 0 {
            return;
        }
        if let Err(e) = self.compact() {
            warn!(surface = "local_file", error = %e, "Failed to compact alert log");
        }
    }

    /// 超过上限时只保留最近的条目，返回删除条数
    pub fn compact(&self) -> Result<usize> {
        use fs2::FileExt;

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        file.lock_exclusive()?;

        let result = (|| -> Result<usize> {
            let lines: Vec<String> = BufReader::new(&file)
                .lines()
                .collect::<std::io::Result<_>>()?;
            if lines.len() <= self.max_entries {
                return Ok(0);
            }

            let start = lines.len() - self.keep_after_compact;
            let temp_path = self.path.with_extension("tmp");
            {
                let mut temp = File::create(&temp_path)?;
                for line in &lines[start..] {
                    writeln!(temp, "{line}")?;
                }
                temp.sync_all()?;
            }
            fs::rename(&temp_path, &self.path)?;
            Ok(start)
        })();

        file.unlock()?;
        if let Ok(removed) = result {
            debug!(surface = "local_file", removed, "Alert log compacted");
        }
        result
    }

    /// 读取最近 N 条日志
    pub fn read_recent(&self, n: usize) -> Vec<AlertLogEntry> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let entries: Vec<AlertLogEntry> = BufReader::new(file)
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }
}

impl Default for LocalFileSurface {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl AlertSurface for LocalFileSurface {
    fn name(&self) -> &str {
        "local_file"
    }

    fn post_summary(&self, alert: &SummaryAlert) -> Result<SendResult> {
        let entry = AlertLogEntry {
            ts: Utc::now(),
            action: "post".to_string(),
            kind: Some(alert.kind),
            count: alert.count,
            title: alert.title.clone(),
            body: alert.body.clone(),
            silent: alert.silent,
        };

        match self.append(&entry) {
            Ok(()) => {
                debug!(surface = "local_file", count = alert.count, "Summary recorded to alert log");
                Ok(SendResult::Sent)
            }
            Err(e) => {
                warn!(surface = "local_file", error = %e, "Failed to write alert log");
                Ok(SendResult::Failed(e.to_string()))
            }
        }
    }

    fn cancel_summary(&self) -> Result<()> {
        self.append(&AlertLogEntry {
            ts: Utc::now(),
            action: "cancel".to_string(),
            kind: None,
            count: 0,
            title: String::new(),
            body: String::new(),
            silent: true,
        })
    }
}
