//! 事件采集管道 - 过滤、分类并持久化宿主推送的通知
//!
//! # 处理步骤
//! 1. 丢弃本应用自身的通知
//! 2. 丢弃常驻（ongoing）与分组摘要（group summary）通知
//! 3. 标题与正文 trim 后均为空则丢弃
//! 4. 分类器判定重要性（仅读本地状态）
//! 5. 解析显示名与图标，失败时回落为 source_id、无图标
//! 6. 原子追加到存储；失败立即重试一次，仍失败则上报并丢弃
//! 7. 重要通知触发汇总重新计算

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::classifier::Classifier;
use super::record::{NewNotification, NotificationRecord};
use super::resolver::{Resolution, SourceResolver};
use super::store::EventStore;
use super::summary::SummaryAggregator;
use crate::config::ConfigStore;
use crate::error::{ErrorSignal, HubError};

/// 本应用自身的来源标识
pub const APP_SOURCE_ID: &str = "notification-hub";

/// 宿主附带的通知标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFlags {
    /// 常驻通知（音乐播放、下载进度等）
    #[serde(default)]
    pub ongoing: bool,
    /// 分组摘要通知
    #[serde(default)]
    pub group_summary: bool,
}

/// 事件类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    Posted,
    Removed,
}

/// 宿主推送的原始事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// 宿主给出的时间（Unix 毫秒），缺省时使用采集时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_hint: Option<i64>,
    #[serde(default)]
    pub flags: EventFlags,
    #[serde(default)]
    pub kind: EventKind,
}

impl RawEvent {
    /// 创建一条 posted 事件
    pub fn posted(
        source_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            category: None,
            title: Some(title.into()),
            body: Some(body.into()),
            timestamp_hint: None,
            flags: EventFlags::default(),
            kind: EventKind::Posted,
        }
    }

    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_hint = Some(timestamp_ms);
        self
    }

    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// 丢弃原因（均不是错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    SelfNotification,
    /// 移除事件只记录日志
    Removal,
    Ongoing,
    GroupSummary,
    EmptyContent,
    /// 监听权限已撤销
    ListenerInactive,
    /// 写入重试后仍失败，事件丢失
    StorageFailure,
}

/// 采集结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Stored(NotificationRecord),
    Discarded(DiscardReason),
}

impl IntakeOutcome {
    pub fn record(&self) -> Option<&NotificationRecord> {
        match self {
            IntakeOutcome::Stored(record) => Some(record),
            IntakeOutcome::Discarded(_) => None,
        }
    }
}

/// 采集管道
pub struct IntakePipeline {
    own_source_id: String,
    store: Arc<dyn EventStore>,
    classifier: Classifier,
    resolver: Arc<dyn SourceResolver>,
    summary: Option<Arc<SummaryAggregator>>,
    errors: ErrorSignal,
}

impl IntakePipeline {
    pub fn new(
        store: Arc<dyn EventStore>,
        resolver: Arc<dyn SourceResolver>,
        errors: ErrorSignal,
    ) -> Self {
        Self {
            own_source_id: APP_SOURCE_ID.to_string(),
            classifier: Classifier::new(Arc::clone(&store), errors.clone()),
            store,
            resolver,
            summary: None,
            errors,
        }
    }

    /// 设置自身来源标识
    pub fn with_own_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.own_source_id = source_id.into();
        self
    }

    /// 重要通知入库后通知汇总聚合器
    pub fn with_summary(mut self, summary: Arc<SummaryAggregator>) -> Self {
        self.summary = Some(summary);
        self
    }

    /// 采集一条事件，使用当前时间作为缺省时间戳
    pub fn ingest(&self, event: RawEvent) -> IntakeOutcome {
        self.ingest_at(event, chrono::Utc::now().timestamp_millis())
    }

    /// 采集一条事件，`now_ms` 为采集时刻
    pub fn ingest_at(&self, event: RawEvent, now_ms: i64) -> IntakeOutcome {
        if let Some(reason) = self.reject_reason(&event) {
            debug!(source_id = %event.source_id, ?reason, "Event discarded");
            return IntakeOutcome::Discarded(reason);
        }

        let title = event.title.as_deref().unwrap_or("").trim().to_string();
        let body = event.body.as_deref().unwrap_or("").trim().to_string();
        if title.is_empty() && body.is_empty() {
            debug!(source_id = %event.source_id, "Skipping empty notification");
            return IntakeOutcome::Discarded(DiscardReason::EmptyContent);
        }

        let is_important = self.classifier.classify(&event.source_id);
        let (source_name, icon) = self.resolve_source(&event.source_id);

        if let Err(e) = self.store.register_source(&event.source_id, &source_name) {
            self.errors.report("intake", e);
        }

        let new = NewNotification::new(
            event.source_id.clone(),
            title,
            body,
            event.timestamp_hint.unwrap_or(now_ms),
        )
        .with_source_name(source_name)
        .important(is_important)
        .with_icon(icon);

        let record = match self.append_with_retry(new) {
            Some(record) => record,
            None => return IntakeOutcome::Discarded(DiscardReason::StorageFailure),
        };

        info!(
            id = record.id,
            source_id = %record.source_id,
            important = record.is_important,
            "Stored notification"
        );

        if record.is_important {
            if let Some(summary) = &self.summary {
                summary.refresh();
            }
        }

        IntakeOutcome::Stored(record)
    }

    fn reject_reason(&self, event: &RawEvent) -> Option<DiscardReason> {
        if event.kind == EventKind::Removed {
            return Some(DiscardReason::Removal);
        }
        if event.source_id == self.own_source_id {
            return Some(DiscardReason::SelfNotification);
        }
        if event.flags.ongoing {
            return Some(DiscardReason::Ongoing);
        }
        if event.flags.group_summary {
            return Some(DiscardReason::GroupSummary);
        }
        None
    }

    fn resolve_source(&self, source_id: &str) -> (String, Option<Vec<u8>>) {
        match self.resolver.resolve(source_id) {
            Ok(Resolution::Found(found)) => (found.display_name, found.icon),
            Ok(Resolution::NotFound) => {
                debug!(source_id, "Could not resolve source name");
                (source_id.to_string(), None)
            }
            Err(e) => {
                self.errors.report("intake", e);
                (source_id.to_string(), None)
            }
        }
    }

    fn append_with_retry(&self, new: NewNotification) -> Option<NotificationRecord> {
        match self.store.insert(new.clone()) {
            Ok(record) => Some(record),
            Err(first) => {
                warn!(source_id = %new.source_id, error = %first, "Append failed, retrying once");
                match self.store.insert(new) {
                    Ok(record) => Some(record),
                    Err(second) => {
                        self.errors
                            .report("intake", HubError::StorageWrite(second.to_string()));
                        None
                    }
                }
            }
        }
    }
}

/// 宿主信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    Event(RawEvent),
    /// 监听连接建立（权限授予）
    Connected,
    /// 监听断开（权限撤销）
    Disconnected,
}

/// 采集统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeStats {
    pub stored: usize,
    pub discarded: usize,
    /// 断开连接时被取消的排队事件
    pub cancelled: usize,
}

/// 采集工作线程的发送端
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<HostSignal>,
}

impl IntakeHandle {
    /// 提交宿主信号；工作线程已退出时返回 false
    pub async fn submit(&self, signal: HostSignal) -> bool {
        self.tx.send(signal).await.is_ok()
    }
}

/// 采集工作线程 - 按宿主投递顺序逐条处理
pub struct IntakeWorker {
    pipeline: Arc<IntakePipeline>,
    config: Arc<ConfigStore>,
    errors: ErrorSignal,
    active: bool,
    stats: IntakeStats,
}

impl IntakeWorker {
    /// 启动工作线程；所有 [`IntakeHandle`] 释放后退出并返回统计
    pub fn spawn(
        pipeline: Arc<IntakePipeline>,
        config: Arc<ConfigStore>,
        errors: ErrorSignal,
        capacity: usize,
    ) -> (IntakeHandle, JoinHandle<IntakeStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            pipeline,
            config,
            errors,
            active: true,
            stats: IntakeStats::default(),
        };
        let task = tokio::spawn(worker.run(rx));
        (IntakeHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HostSignal>) -> IntakeStats {
        while let Some(signal) = rx.recv().await {
            match signal {
                HostSignal::Event(event) => self.process(event).await,
                HostSignal::Connected => self.set_active(true),
                HostSignal::Disconnected => {
                    self.set_active(false);
                    self.cancel_pending(&mut rx);
                }
            }
        }
        info!(
            stored = self.stats.stored,
            discarded = self.stats.discarded,
            cancelled = self.stats.cancelled,
            "Intake worker stopped"
        );
        self.stats
    }

    async fn process(&mut self, event: RawEvent) {
        if !self.active {
            self.stats.discarded += 1;
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        match tokio::task::spawn_blocking(move || pipeline.ingest(event)).await {
            Ok(IntakeOutcome::Stored(_)) => self.stats.stored += 1,
            Ok(IntakeOutcome::Discarded(_)) => self.stats.discarded += 1,
            Err(e) => {
                self.stats.discarded += 1;
                self.errors
                    .report("intake", HubError::StorageWrite(format!("Task join error: {e}")));
            }
        }
    }

    fn set_active(&mut self, active: bool) {
        if self.active != active {
            info!(active, "Notification listener state changed");
        }
        self.active = active;
        if let Err(e) = self.config.set_listener_granted(active) {
            self.errors.report("intake", e);
        }
    }

    /// 丢弃断开前已排队的事件；遇到重新连接则停止
    fn cancel_pending(&mut self, rx: &mut mpsc::Receiver<HostSignal>) {
        while let Ok(signal) = rx.try_recv() {
            match signal {
                HostSignal::Event(_) => self.stats.cancelled += 1,
                HostSignal::Disconnected => {}
                HostSignal::Connected => {
                    self.set_active(true);
                    break;
                }
            }
        }
        if self.stats.cancelled > 0 {
            debug!(cancelled = self.stats.cancelled, "Pending events cancelled on disconnect");
        }
    }
}
