//! 组件装配 - 进程启动时构造一次存储、配置与各组件，并显式注入依赖

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::error::{ErrorSignal, Result};
use crate::notification::channels::LocalFileSurface;
use crate::notification::dispatcher::AlertDispatcher;
use crate::notification::intake::{IntakeHandle, IntakeOutcome, IntakePipeline, IntakeStats, IntakeWorker, RawEvent};
use crate::notification::query::{self, LiveView, ViewSnapshot, ViewSpec};
use crate::notification::realert::{ReAlertScheduler, TimerPermission};
use crate::notification::record::SourcePreference;
use crate::notification::resolver::{PreferenceResolver, SourceResolver};
use crate::notification::retention::CleanupEngine;
use crate::notification::store::{EventStore, SqliteStore};
use crate::notification::summary::SummaryAggregator;

/// 采集队列容量
const INTAKE_QUEUE_CAPACITY: usize = 256;

/// 检查其他进程（`nhub read`、`nhub config set` 等）写入的周期
pub const EXTERNAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 各持久化文件位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPaths {
    pub database: PathBuf,
    pub config: PathBuf,
    pub alert_log: PathBuf,
}

impl HubPaths {
    /// 平台默认位置
    pub fn default_paths() -> Self {
        Self {
            database: SqliteStore::default_path(),
            config: ConfigStore::default_path(),
            alert_log: LocalFileSurface::default_path(),
        }
    }

    /// 全部放在同一目录下
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            database: dir.join("notifications.db"),
            config: dir.join("config.json"),
            alert_log: dir.join("alerts.jsonl"),
        }
    }
}

/// 已装配的通知中心
pub struct NotificationHub {
    pub config: Arc<ConfigStore>,
    pub store: Arc<dyn EventStore>,
    pub errors: ErrorSignal,
    pub summary: Arc<SummaryAggregator>,
    pub pipeline: Arc<IntakePipeline>,
    pub cleanup: Arc<CleanupEngine>,
    pub dispatcher: Arc<AlertDispatcher>,
    external_poll: Duration,
}

impl NotificationHub {
    /// 打开磁盘上的存储与配置
    pub fn open(paths: &HubPaths, dispatcher: AlertDispatcher) -> Result<Self> {
        if let Some(parent) = paths.database.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let config = Arc::new(ConfigStore::open(&paths.config)?);
        let store: Arc<dyn EventStore> = Arc::new(SqliteStore::open(&paths.database)?);
        Ok(Self::assemble(config, store, None, dispatcher))
    }

    /// 内存存储与配置
    pub fn in_memory(dispatcher: AlertDispatcher) -> Result<Self> {
        let store: Arc<dyn EventStore> = Arc::new(SqliteStore::open_memory()?);
        Ok(Self::assemble(
            Arc::new(ConfigStore::in_memory()),
            store,
            None,
            dispatcher,
        ))
    }

    /// 用已有组件装配；未给出解析器时使用偏好中的显示名
    pub fn assemble(
        config: Arc<ConfigStore>,
        store: Arc<dyn EventStore>,
        resolver: Option<Arc<dyn SourceResolver>>,
        dispatcher: AlertDispatcher,
    ) -> Self {
        let errors = ErrorSignal::default();
        let resolver: Arc<dyn SourceResolver> = match resolver {
            Some(resolver) => resolver,
            None => Arc::new(PreferenceResolver::new(Arc::clone(&store))),
        };
        let summary = Arc::new(SummaryAggregator::new(Arc::clone(&store), errors.clone()));
        let pipeline = Arc::new(
            IntakePipeline::new(Arc::clone(&store), resolver, errors.clone())
                .with_summary(Arc::clone(&summary)),
        );
        let cleanup = Arc::new(CleanupEngine::new(
            Arc::clone(&store),
            Arc::clone(&config),
            errors.clone(),
        ));

        Self {
            config,
            store,
            errors,
            summary,
            pipeline,
            cleanup,
            dispatcher: Arc::new(dispatcher),
            external_poll: EXTERNAL_POLL_INTERVAL,
        }
    }

    /// 设置检查外部写入的周期
    pub fn with_external_poll(mut self, period: Duration) -> Self {
        self.external_poll = period;
        self
    }

    /// 同步采集一条事件
    pub fn ingest(&self, event: RawEvent) -> IntakeOutcome {
        self.pipeline.ingest(event)
    }

    /// 一次性视图查询
    pub fn view(&self, spec: &ViewSpec) -> ViewSnapshot {
        query::load(self.store.as_ref(), spec, &self.errors)
    }

    /// 实时视图（需要 tokio 运行时）
    pub fn live_view(&self, spec: ViewSpec) -> LiveView {
        LiveView::spawn(Arc::clone(&self.store), spec, self.errors.clone())
    }

    /// 设置来源重要性；只影响之后采集的记录
    pub fn set_importance(
        &self,
        source_id: &str,
        display_name: Option<&str>,
        important: bool,
    ) -> Result<SourcePreference> {
        let display_name = match display_name {
            Some(name) => name.to_string(),
            None => self
                .store
                .preference(source_id)?
                .map(|p| p.display_name)
                .unwrap_or_else(|| source_id.to_string()),
        };
        let preference = SourcePreference::new(source_id, display_name, important);
        self.store.upsert_preference(&preference)?;
        info!(source_id, important, "Source importance updated");
        Ok(preference)
    }

    /// 清空全部记录；可选同时把所有来源重置为非重要
    pub fn clear_all(&self, reset_preferences: bool) -> Result<usize> {
        let deleted = self.store.clear_all()?;
        if reset_preferences {
            let reset = self.store.reset_preferences()?;
            debug!(reset, "Source preferences reset");
        }
        self.summary.refresh();
        self.dispatcher.cancel_summary();
        Ok(deleted)
    }

    /// 启动后台组件：汇总跟随、重提醒、每日清理与采集线程
    pub fn start(&self, permission: Option<Arc<dyn TimerPermission>>) -> HubRuntime {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let follow = Arc::clone(&self.summary).spawn_follow();

        let mut scheduler = ReAlertScheduler::new(
            Arc::clone(&self.summary),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.config),
            self.errors.clone(),
        );
        if let Some(permission) = permission {
            scheduler = scheduler.with_timer_permission(permission);
        }
        let scheduler = Arc::new(scheduler);
        let scheduler_task = Arc::clone(&scheduler).spawn(shutdown_rx.clone());

        let cleanup_task = Arc::clone(&self.cleanup).spawn_daily(shutdown_rx.clone());

        let watch_task = spawn_external_watch(
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            self.errors.clone(),
            self.external_poll,
            shutdown_rx,
        );

        let (intake, intake_task) = IntakeWorker::spawn(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.config),
            self.errors.clone(),
            INTAKE_QUEUE_CAPACITY,
        );

        info!("Notification hub started");
        HubRuntime {
            shutdown: shutdown_tx,
            intake,
            intake_task,
            scheduler,
            follow,
            tasks: vec![scheduler_task, cleanup_task, watch_task],
        }
    }
}

/// 周期性吸收其他进程对数据库和配置文件的修改
///
/// 数据库有外部提交时递增存储的变更版本号，汇总与实时视图随之重新查询；
/// 配置重新加载后，新的重提醒间隔从下一次布防开始生效。
fn spawn_external_watch(
    store: Arc<dyn EventStore>,
    config: Arc<ConfigStore>,
    errors: ErrorSignal,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 持续失败只上报一次
        let mut failing = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            let store = Arc::clone(&store);
            let config = Arc::clone(&config);
            let polled = tokio::task::spawn_blocking(move || {
                (config.reload(), store.poll_external_changes())
            })
            .await;

            let (config_changed, store_changed) = match polled {
                Ok(results) => results,
                Err(e) => {
                    warn!(error = %e, "External change poll task failed");
                    continue;
                }
            };

            let mut failed = false;
            for (component, result) in [("config", config_changed), ("store", store_changed)] {
                match result {
                    Ok(true) => debug!(component, "Picked up change from another process"),
                    Ok(false) => {}
                    Err(e) => {
                        failed = true;
                        if !failing {
                            errors.report(component, e);
                        }
                    }
                }
            }
            failing = failed;
        }
        debug!("External change watch stopped");
    })
}

/// 运行中的后台组件
pub struct HubRuntime {
    shutdown: watch::Sender<bool>,
    intake: IntakeHandle,
    intake_task: JoinHandle<IntakeStats>,
    scheduler: Arc<ReAlertScheduler>,
    follow: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl HubRuntime {
    /// 采集线程的发送端
    pub fn intake(&self) -> &IntakeHandle {
        &self.intake
    }

    pub fn scheduler(&self) -> &Arc<ReAlertScheduler> {
        &self.scheduler
    }

    /// 排空采集队列后停止所有后台任务
    pub async fn shutdown(self) -> IntakeStats {
        drop(self.intake);
        let stats = self.intake_task.await.unwrap_or_default();

        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        self.follow.abort();

        info!(stored = stats.stored, discarded = stats.discarded, "Notification hub stopped");
        stats
    }
}
