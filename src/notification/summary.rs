//! 汇总聚合器 - 维护"未读重要通知"的实时视图
//!
//! 视图通过 `watch` 通道发布；存储每次变更后重新计算，重提醒调度器与界面观察者
//! 都订阅同一份快照。

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::record::NotificationRecord;
use super::store::{EventStore, RecordQuery};
use crate::error::{ErrorSignal, HubError};

/// 未读重要通知快照（时间倒序）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadSummary {
    pub records: Vec<NotificationRecord>,
}

impl UnreadSummary {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn newest(&self) -> Option<&NotificationRecord> {
        self.records.first()
    }
}

/// 汇总聚合器
pub struct SummaryAggregator {
    store: Arc<dyn EventStore>,
    errors: ErrorSignal,
    tx: watch::Sender<UnreadSummary>,
    /// 串行化重新计算，避免旧快照覆盖新快照
    refresh_lock: Mutex<()>,
}

impl SummaryAggregator {
    /// 创建聚合器并立即计算初始快照
    pub fn new(store: Arc<dyn EventStore>, errors: ErrorSignal) -> Self {
        let (tx, _) = watch::channel(UnreadSummary::default());
        let aggregator = Self {
            store,
            errors,
            tx,
            refresh_lock: Mutex::new(()),
        };
        aggregator.refresh();
        aggregator
    }

    /// 重新计算并在内容变化时发布，返回当前未读重要数
    ///
    /// 读取失败时保留上一份快照并上报错误信号。
    pub fn refresh(&self) -> usize {
        let _guard = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());

        match self.store.query(&RecordQuery::UnreadImportant) {
            Ok(records) => {
                let changed = self.tx.send_if_modified(|current| {
                    if current.records == records {
                        false
                    } else {
                        current.records = records;
                        true
                    }
                });
                let count = self.tx.borrow().count();
                if changed {
                    debug!(count, "Unread important summary updated");
                }
                count
            }
            Err(e) => {
                self.errors.report("summary", e);
                self.tx.borrow().count()
            }
        }
    }

    /// 在阻塞线程池上执行 [`refresh`](Self::refresh)，供异步任务调用
    pub async fn refresh_blocking(self: &Arc<Self>) -> usize {
        let aggregator = Arc::clone(self);
        match tokio::task::spawn_blocking(move || aggregator.refresh()).await {
            Ok(count) => count,
            Err(e) => {
                self.errors.report(
                    "summary",
                    HubError::StorageRead(format!("Task join error: {e}")),
                );
                self.unread_important_count()
            }
        }
    }

    /// 当前未读重要通知（时间倒序）
    pub fn unread_important(&self) -> Vec<NotificationRecord> {
        self.tx.borrow().records.clone()
    }

    pub fn unread_important_count(&self) -> usize {
        self.tx.borrow().count()
    }

    /// 订阅快照；每次变更都会收到新值
    pub fn subscribe(&self) -> watch::Receiver<UnreadSummary> {
        self.tx.subscribe()
    }

    /// 标记单条已读；id 不存在不是错误
    pub fn mark_as_read(&self, id: i64) -> bool {
        let marked = match self.store.mark_read(id) {
            Ok(marked) => marked,
            Err(e) => {
                self.errors.report("summary", e);
                false
            }
        };
        self.refresh();
        marked
    }

    /// 将全部重要通知标记已读，返回受影响条数
    pub fn mark_all_important_as_read(&self) -> usize {
        let count = match self.store.mark_all_important_read() {
            Ok(count) => count,
            Err(e) => {
                self.errors.report("summary", e);
                0
            }
        };
        self.refresh();
        info!(count, "All important notifications marked as read");
        count
    }

    /// 后台跟随存储变更，直到存储被释放
    pub fn spawn_follow(self: Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                self.refresh_blocking().await;
            }
            debug!("Store change feed closed, summary follower stopped");
        })
    }
}
