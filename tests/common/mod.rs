//! 集成测试共用的测试替身

#![allow(dead_code)]

use notification_hub::notification::channel::{AlertSurface, SendResult, SummaryAlert};
use notification_hub::notification::record::{NewNotification, NotificationRecord, SourcePreference};
use notification_hub::notification::store::{EventStore, RecordQuery, SqliteStore};
use notification_hub::HubError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

type Result<T> = std::result::Result<T, HubError>;

/// 可注入失败的存储
pub struct FlakyStore {
    pub inner: SqliteStore,
    insert_failures: AtomicU32,
    query_failures: AtomicU32,
    delete_failures: AtomicU32,
    delete_error: Mutex<Option<HubError>>,
    pub delete_attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_memory().unwrap(),
            insert_failures: AtomicU32::new(0),
            query_failures: AtomicU32::new(0),
            delete_failures: AtomicU32::new(0),
            delete_error: Mutex::new(None),
            delete_attempts: AtomicU32::new(0),
        }
    }

    /// 接下来 `n` 次插入失败
    pub fn fail_inserts(&self, n: u32) {
        self.insert_failures.store(n, Ordering::SeqCst);
    }

    /// 接下来 `n` 次记录查询失败
    pub fn fail_queries(&self, n: u32) {
        self.query_failures.store(n, Ordering::SeqCst);
    }

    /// 接下来 `n` 次按时间删除返回 `error`
    pub fn fail_deletes(&self, n: u32, error: HubError) {
        self.delete_failures.store(n, Ordering::SeqCst);
        *self.delete_error.lock().unwrap() = Some(error);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl EventStore for FlakyStore {
    fn insert(&self, new: NewNotification) -> Result<NotificationRecord> {
        if Self::take_failure(&self.insert_failures) {
            return Err(HubError::StorageWrite("disk I/O error".into()));
        }
        self.inner.insert(new)
    }

    fn get(&self, id: i64) -> Result<Option<NotificationRecord>> {
        self.inner.get(id)
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<NotificationRecord>> {
        if Self::take_failure(&self.query_failures) {
            return Err(HubError::StorageRead("database disk image is malformed".into()));
        }
        self.inner.query(query)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }

    fn unread_important_count(&self) -> Result<usize> {
        self.inner.unread_important_count()
    }

    fn mark_read(&self, id: i64) -> Result<bool> {
        self.inner.mark_read(id)
    }

    fn mark_all_important_read(&self) -> Result<usize> {
        self.inner.mark_all_important_read()
    }

    fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.delete_failures) {
            let error = self.delete_error.lock().unwrap().clone();
            return Err(error.unwrap_or_else(|| HubError::StorageBusy("locked".into())));
        }
        self.inner.delete_older_than(cutoff_ms)
    }

    fn keep_newest(&self, keep: usize) -> Result<usize> {
        self.inner.keep_newest(keep)
    }

    fn clear_all(&self) -> Result<usize> {
        self.inner.clear_all()
    }

    fn preference(&self, source_id: &str) -> Result<Option<SourcePreference>> {
        self.inner.preference(source_id)
    }

    fn upsert_preference(&self, preference: &SourcePreference) -> Result<()> {
        self.inner.upsert_preference(preference)
    }

    fn register_source(&self, source_id: &str, display_name: &str) -> Result<bool> {
        self.inner.register_source(source_id, display_name)
    }

    fn preferences(&self) -> Result<Vec<SourcePreference>> {
        self.inner.preferences()
    }

    fn important_source_count(&self) -> Result<usize> {
        self.inner.important_source_count()
    }

    fn reset_preferences(&self) -> Result<usize> {
        self.inner.reset_preferences()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.subscribe()
    }

    fn poll_external_changes(&self) -> Result<bool> {
        self.inner.poll_external_changes()
    }
}

/// 记录所有汇总提醒的渠道
#[derive(Default)]
pub struct RecordingSurface {
    pub posts: Mutex<Vec<SummaryAlert>>,
    pub cancels: AtomicU32,
}

impl RecordingSurface {
    pub fn posts(&self) -> Vec<SummaryAlert> {
        self.posts.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl AlertSurface for RecordingSurface {
    fn name(&self) -> &str {
        "recording"
    }

    fn post_summary(&self, alert: &SummaryAlert) -> anyhow::Result<SendResult> {
        self.posts.lock().unwrap().push(alert.clone());
        Ok(SendResult::Sent)
    }

    fn cancel_summary(&self) -> anyhow::Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
