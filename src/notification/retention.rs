//! 保留与清理 - 按时间和数量两条阈值裁剪历史记录
//!
//! 两条阈值都是累积不变量：错过一次清理不会造成问题，下一次运行会补上。

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::EventStore;
use crate::config::ConfigStore;
use crate::error::{ErrorSignal, HubError, Result};

/// 最多保留的记录数
pub const MAX_RECORDS: usize = 1000;

/// 每条记录的估算大小（字节）
pub const ESTIMATED_BYTES_PER_RECORD: u64 = 512;

/// 定时清理周期
pub const CLEANUP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// 周期末尾允许的执行窗口
pub const CLEANUP_FLEX: Duration = Duration::from_secs(6 * 60 * 60);

const DAY_MS: i64 = 86_400_000;

/// 瞬时错误的重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 首次退避（毫秒）
    pub initial_backoff_ms: u64,
    /// 退避上限（毫秒）
    pub max_backoff_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 第 `retry` 次重试前的等待时间（从 0 开始）
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(i32::try_from(retry).unwrap_or(i32::MAX));
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

/// 一次清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_by_age: usize,
    pub deleted_by_count: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.deleted_by_age + self.deleted_by_count
    }
}

/// 存储占用估算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageEstimate {
    pub records: usize,
    pub bytes: u64,
}

impl StorageEstimate {
    pub fn from_count(records: usize) -> Self {
        Self {
            records,
            bytes: records as u64 * ESTIMATED_BYTES_PER_RECORD,
        }
    }

    /// 人类可读的大小
    pub fn display_size(&self) -> String {
        let kb = self.bytes as f64 / 1024.0;
        if kb < 1024.0 {
            format!("{kb:.1} KB")
        } else {
            format!("{:.1} MB", kb / 1024.0)
        }
    }
}

/// 清理引擎
pub struct CleanupEngine {
    store: Arc<dyn EventStore>,
    config: Arc<ConfigStore>,
    errors: ErrorSignal,
    retry: RetryConfig,
    max_records: usize,
}

impl CleanupEngine {
    pub fn new(store: Arc<dyn EventStore>, config: Arc<ConfigStore>, errors: ErrorSignal) -> Self {
        Self {
            store,
            config,
            errors,
            retry: RetryConfig::default(),
            max_records: MAX_RECORDS,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// 执行一次清理（无重试）
    pub fn cleanup_once(&self, now_ms: i64) -> Result<CleanupReport> {
        let retention_days = i64::from(self.config.retention_days());
        let cutoff = now_ms.saturating_sub(retention_days * DAY_MS);

        let deleted_by_age = self.store.delete_older_than(cutoff)?;
        let deleted_by_count = self.store.keep_newest(self.max_records)?;

        Ok(CleanupReport {
            deleted_by_age,
            deleted_by_count,
        })
    }

    /// 以当前时间执行清理，瞬时错误按退避重试
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        self.run_cleanup_at(chrono::Utc::now().timestamp_millis()).await
    }

    /// 以指定时间执行清理
    ///
    /// 瞬时错误重试耗尽后返回 [`HubError::CleanupTransient`]；非瞬时错误立即放弃。
    /// 两种失败都会上报错误信号。
    pub async fn run_cleanup_at(&self, now_ms: i64) -> Result<CleanupReport> {
        let mut retry = 0;
        loop {
            match self.cleanup_once(now_ms) {
                Ok(report) => {
                    if report.total() > 0 {
                        info!(
                            by_age = report.deleted_by_age,
                            by_count = report.deleted_by_count,
                            "Cleanup removed old notifications"
                        );
                    } else {
                        debug!("Cleanup found nothing to remove");
                    }
                    return Ok(report);
                }
                Err(e) if e.is_transient() && retry < self.retry.max_retries => {
                    let wait = self.retry.backoff(retry);
                    retry += 1;
                    warn!(attempt = retry, wait_ms = wait.as_millis() as u64, error = %e, "Cleanup hit transient error, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    let error = if e.is_transient() {
                        HubError::CleanupTransient {
                            attempts: retry + 1,
                            message: e.to_string(),
                        }
                    } else {
                        e
                    };
                    self.errors.report("cleanup", error.clone());
                    return Err(error);
                }
            }
        }
    }

    /// 估算存储占用；先执行一次清理
    pub async fn storage_estimate(&self) -> Result<StorageEstimate> {
        if let Err(e) = self.run_cleanup().await {
            debug!(error = %e, "Cleanup before estimate failed, estimating anyway");
        }
        Ok(StorageEstimate::from_count(self.store.count()?))
    }

    /// 后台每日清理：启动时执行一次，之后每个周期在末尾窗口内随机时刻执行
    pub fn spawn_daily(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                // 失败已上报，等下一个周期
                let _ = self.run_cleanup().await;

                let delay = next_run_delay(CLEANUP_PERIOD, CLEANUP_FLEX, jitter_seed());
                debug!(in_secs = delay.as_secs(), "Next cleanup scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Daily cleanup stopped");
        })
    }
}

/// 下一次运行的延迟：落在 `[period - flex, period)` 内
pub fn next_run_delay(period: Duration, flex: Duration, seed: u64) -> Duration {
    let flex = flex.min(period);
    let flex_ms = flex.as_millis() as u64;
    let jitter = if flex_ms == 0 { 0 } else { seed % flex_ms };
    period - flex + Duration::from_millis(jitter)
}

fn jitter_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::record::NewNotification;
    use crate::notification::store::SqliteStore;

    const NOW: i64 = 1_700_000_000_000;

    fn engine(store: Arc<SqliteStore>) -> CleanupEngine {
        CleanupEngine::new(store, Arc::new(ConfigStore::in_memory()), ErrorSignal::default())
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(2), Duration::from_millis(400));
        assert_eq!(retry.backoff(3), Duration::from_millis(500));
    }

    #[test]
    fn test_age_threshold_uses_retention_days() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let engine = engine(store.clone());
        let cutoff = NOW - 7 * DAY_MS;

        store.insert(NewNotification::new("a", "old", "", cutoff - 1)).unwrap();
        store.insert(NewNotification::new("a", "edge", "", cutoff)).unwrap();
        store.insert(NewNotification::new("a", "new", "", NOW)).unwrap();

        let report = engine.cleanup_once(NOW).unwrap();
        assert_eq!(report.deleted_by_age, 1);
        assert_eq!(report.deleted_by_count, 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_shorter_retention_deletes_more() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let config = Arc::new(ConfigStore::in_memory());
        config.set_retention_days(1).unwrap();
        let engine = CleanupEngine::new(store.clone(), config, ErrorSignal::default());

        store
            .insert(NewNotification::new("a", "two days", "", NOW - 2 * DAY_MS))
            .unwrap();
        store.insert(NewNotification::new("a", "now", "", NOW)).unwrap();

        assert_eq!(engine.cleanup_once(NOW).unwrap().total(), 1);
    }

    #[test]
    fn test_count_threshold_keeps_newest() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let engine = engine(store.clone()).with_max_records(3);
        for i in 0..5 {
            store.insert(NewNotification::new("a", format!("n{i}"), "", NOW - i)).unwrap();
        }

        let report = engine.cleanup_once(NOW).unwrap();
        assert_eq!(report.deleted_by_count, 2);
        let titles: Vec<_> = store
            .query(&crate::notification::store::RecordQuery::All)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["n0", "n1", "n2"]);
    }

    #[test]
    fn test_next_run_delay_stays_in_flex_window() {
        for seed in [0, 1, 17_999_999, u64::from(u32::MAX)] {
            let delay = next_run_delay(CLEANUP_PERIOD, CLEANUP_FLEX, seed);
            assert!(delay >= CLEANUP_PERIOD - CLEANUP_FLEX);
            assert!(delay < CLEANUP_PERIOD);
        }
    }

    #[test]
    fn test_storage_estimate_display() {
        assert_eq!(StorageEstimate::from_count(2).display_size(), "1.0 KB");
        assert_eq!(StorageEstimate::from_count(4096).display_size(), "2.0 MB");
    }

    #[tokio::test]
    async fn test_storage_estimate_runs_cleanup_first() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let engine = engine(store.clone()).with_max_records(2);
        let now = chrono::Utc::now().timestamp_millis();
        for i in 0..4 {
            store.insert(NewNotification::new("a", "t", "", now - i)).unwrap();
        }

        let estimate = engine.storage_estimate().await.unwrap();
        assert_eq!(estimate.records, 2);
        assert_eq!(estimate.bytes, 1024);
    }
}
