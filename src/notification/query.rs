//! 实时视图 - 展示层查询的订阅模型
//!
//! 每个视图在存储变更时重新查询并发布新快照，而非一次性结果。

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::deduplicator::NotificationDeduplicator;
use super::record::NotificationRecord;
use super::store::{EventStore, RecordQuery};
use crate::error::{ErrorSignal, HubError};

/// 视图快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub records: Vec<NotificationRecord>,
    /// 最近一次查询失败时的错误（此时 records 为空）
    pub error: Option<HubError>,
}

/// 视图配置
#[derive(Debug, Clone)]
pub struct ViewSpec {
    pub query: RecordQuery,
    /// 是否对结果做读取期去重
    pub dedupe: Option<NotificationDeduplicator>,
}

impl ViewSpec {
    pub fn new(query: RecordQuery) -> Self {
        Self {
            query,
            dedupe: Some(NotificationDeduplicator::new()),
        }
    }

    /// 不去重，返回原始记录
    pub fn raw(mut self) -> Self {
        self.dedupe = None;
        self
    }
}

/// 执行一次视图查询
///
/// 读取失败时返回空结果并附带错误，同时上报错误信号。
pub fn load(store: &dyn EventStore, spec: &ViewSpec, errors: &ErrorSignal) -> ViewSnapshot {
    match store.query(&spec.query) {
        Ok(records) => {
            let records = match &spec.dedupe {
                Some(dedup) => dedup.dedupe(records),
                None => records,
            };
            ViewSnapshot {
                records,
                error: None,
            }
        }
        Err(e) => {
            errors.report("view", e.clone());
            ViewSnapshot {
                records: Vec::new(),
                error: Some(e),
            }
        }
    }
}

/// 实时视图
pub struct LiveView {
    rx: watch::Receiver<ViewSnapshot>,
    task: JoinHandle<()>,
}

impl LiveView {
    /// 启动视图：立即查询一次，之后每次存储变更重新查询
    pub fn spawn(store: Arc<dyn EventStore>, spec: ViewSpec, errors: ErrorSignal) -> Self {
        let mut changes = store.subscribe();
        let initial = load(store.as_ref(), &spec, &errors);
        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let snapshot = load(store.as_ref(), &spec, &errors);
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
            debug!(query = ?spec.query, "Live view stopped");
        });

        Self { rx, task }
    }

    /// 当前快照
    pub fn current(&self) -> ViewSnapshot {
        self.rx.borrow().clone()
    }

    /// 等待下一次变更
    pub async fn changed(&mut self) -> Option<ViewSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn receiver(&self) -> watch::Receiver<ViewSnapshot> {
        self.rx.clone()
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::record::NewNotification;
    use crate::notification::store::SqliteStore;
    use std::time::Duration;

    #[test]
    fn test_load_applies_dedupe_unless_raw() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert(NewNotification::new("X", "Hi", "there", 1000)).unwrap();
        store.insert(NewNotification::new("X", "Hi", "there", 3000)).unwrap();
        let errors = ErrorSignal::default();

        let deduped = load(&store, &ViewSpec::new(RecordQuery::All), &errors);
        assert_eq!(deduped.records.len(), 1);
        assert_eq!(deduped.records[0].timestamp, 1000);

        let raw = load(&store, &ViewSpec::new(RecordQuery::All).raw(), &errors);
        assert_eq!(raw.records.len(), 2);
    }

    #[tokio::test]
    async fn test_live_view_reissues_on_change() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let mut view = LiveView::spawn(
            store.clone(),
            ViewSpec::new(RecordQuery::Search("invoice".into())),
            ErrorSignal::default(),
        );
        assert!(view.current().records.is_empty());

        store
            .insert(NewNotification::new("mail", "Invoice #4", "due", 1))
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), view.changed())
            .await
            .expect("view update")
            .expect("view alive");
        assert_eq!(snapshot.records.len(), 1);
        assert!(snapshot.error.is_none());
    }
}
