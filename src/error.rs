//! 错误类型 - 核心组件的错误分类与旁路错误信号
//!
//! 组件边界内的失败都在本地收敛：记录日志，并通过 [`ErrorSignal`] 广播给观察者，
//! 不会跨组件抛出，也不会终止进程。

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// 核心错误分类
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// 写入存储失败 (HUB001)
    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    /// 读取存储失败 (HUB002)
    #[error("Storage read failed: {0}")]
    StorageRead(String),

    /// 存储暂时繁忙，可重试 (HUB003)
    #[error("Storage busy: {0}")]
    StorageBusy(String),

    /// 图标/名称解析不可用 (HUB004)
    #[error("Source resolver unavailable: {0}")]
    ResolverUnavailable(String),

    /// 宿主拒绝精确定时器权限 (HUB005)
    #[error("Exact timer permission denied: {0}")]
    SchedulerPermissionDenied(String),

    /// 清理在重试后仍然失败 (HUB006)
    #[error("Cleanup failed after {attempts} attempts: {message}")]
    CleanupTransient { attempts: u32, message: String },

    /// 配置错误 (HUB007)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 非法输入 (HUB008)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO 错误 (HUB009)
    #[error("IO error: {0}")]
    Io(String),
}

impl HubError {
    /// 分类错误码
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StorageWrite(_) => "HUB001",
            Self::StorageRead(_) => "HUB002",
            Self::StorageBusy(_) => "HUB003",
            Self::ResolverUnavailable(_) => "HUB004",
            Self::SchedulerPermissionDenied(_) => "HUB005",
            Self::CleanupTransient { .. } => "HUB006",
            Self::Config(_) => "HUB007",
            Self::InvalidInput(_) => "HUB008",
            Self::Io(_) => "HUB009",
        }
    }

    /// 是否为可重试的瞬时错误
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StorageBusy(_))
    }

    /// 将 rusqlite 写错误归类（忙/锁定视为瞬时）
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        if is_busy(&err) {
            Self::StorageBusy(err.to_string())
        } else {
            Self::StorageWrite(err.to_string())
        }
    }

    /// 将 rusqlite 读错误归类（忙/锁定视为瞬时）
    pub(crate) fn from_read(err: rusqlite::Error) -> Self {
        if is_busy(&err) {
            Self::StorageBusy(err.to_string())
        } else {
            Self::StorageRead(err.to_string())
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

impl From<rusqlite::Error> for HubError {
    fn from(err: rusqlite::Error) -> Self {
        Self::from_write(err)
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// 旁路错误事件
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// 上报组件名
    pub component: &'static str,
    pub error: HubError,
    pub at: DateTime<Utc>,
}

/// 旁路错误信号 - 观察者订阅组件内部已收敛的失败
#[derive(Debug, Clone)]
pub struct ErrorSignal {
    tx: broadcast::Sender<ErrorEvent>,
}

impl ErrorSignal {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 上报错误；没有订阅者时只记录日志
    pub fn report(&self, component: &'static str, error: HubError) {
        warn!(component, code = error.code(), error = %error, "Contained failure");
        let _ = self.tx.send(ErrorEvent {
            component,
            error,
            at: Utc::now(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ErrorEvent> {
        self.tx.subscribe()
    }
}

impl Default for ErrorSignal {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            HubError::StorageWrite(String::new()),
            HubError::StorageRead(String::new()),
            HubError::StorageBusy(String::new()),
            HubError::ResolverUnavailable(String::new()),
            HubError::SchedulerPermissionDenied(String::new()),
            HubError::CleanupTransient {
                attempts: 1,
                message: String::new(),
            },
            HubError::Config(String::new()),
            HubError::InvalidInput(String::new()),
            HubError::Io(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(HubError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_busy_is_transient() {
        assert!(HubError::StorageBusy("locked".into()).is_transient());
        assert!(!HubError::StorageWrite("disk full".into()).is_transient());
        assert!(!HubError::StorageRead("corrupt".into()).is_transient());
    }

    #[tokio::test]
    async fn test_error_signal_delivers_to_subscribers() {
        let signal = ErrorSignal::default();
        let mut rx = signal.subscribe();

        signal.report("intake", HubError::StorageWrite("boom".into()));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.component, "intake");
        assert_eq!(event.error, HubError::StorageWrite("boom".into()));
    }

    #[test]
    fn test_report_without_subscribers_does_not_panic() {
        let signal = ErrorSignal::default();
        signal.report("cleanup", HubError::StorageBusy("busy".into()));
    }
}
