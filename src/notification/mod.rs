//! 通知核心 - 采集、分类、存储、去重、汇总、重提醒与清理
//!
//! # 数据流
//! 宿主事件 → [`IntakePipeline`]（分类、解析、追加）→ [`SqliteStore`]
//! → [`SummaryAggregator`] 重新计算 → [`ReAlertScheduler`] 定时提醒。
//! [`NotificationDeduplicator`] 只在读取展示列表时折叠重复项。

pub mod channel;
pub mod channels;
pub mod classifier;
pub mod deduplicator;
pub mod dispatcher;
pub mod host;
pub mod intake;
pub mod query;
pub mod realert;
pub mod record;
pub mod resolver;
pub mod retention;
pub mod store;
pub mod summary;

pub use channel::{AlertKind, AlertSurface, SendResult, SummaryAlert};
pub use classifier::Classifier;
pub use deduplicator::{dedupe, NotificationDeduplicator, DEFAULT_DEDUP_WINDOW_MS};
pub use dispatcher::AlertDispatcher;
pub use host::{parse_host_line, pump_lines, HostMessage};
pub use intake::{
    DiscardReason, EventFlags, EventKind, HostSignal, IntakeHandle, IntakeOutcome,
    IntakePipeline, IntakeStats, IntakeWorker, RawEvent, APP_SOURCE_ID,
};
pub use query::{LiveView, ViewSnapshot, ViewSpec};
pub use realert::{
    ExactTimers, ReAlertMachine, ReAlertScheduler, SchedulerAction, SchedulerState,
    TimerPermission,
};
pub use record::{NewNotification, NotificationRecord, SourcePreference, MAX_ICON_BYTES};
pub use resolver::{MapResolver, NullResolver, PreferenceResolver, Resolution, ResolvedSource, SourceResolver};
pub use retention::{CleanupEngine, CleanupReport, RetryConfig, StorageEstimate, MAX_RECORDS};
pub use store::{EventStore, RecordQuery, SqliteStore};
pub use summary::{SummaryAggregator, UnreadSummary};
