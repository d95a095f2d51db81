//! Notification Hub - 采集通知、按来源标记重要性，并对未读重要通知定时重提醒

pub mod cli;
pub mod config;
pub mod error;
pub mod hub;
pub mod notification;

pub use config::{ConfigKey, ConfigStore, HubSettings};
pub use error::{ErrorEvent, ErrorSignal, HubError};
pub use hub::{HubPaths, HubRuntime, NotificationHub};
pub use notification::{
    AlertDispatcher, CleanupEngine, DiscardReason, EventStore, IntakeOutcome, IntakePipeline,
    NotificationDeduplicator, NotificationRecord, RawEvent, ReAlertScheduler, RecordQuery,
    SchedulerState, SourcePreference, SqliteStore, SummaryAggregator,
};
