//! 重提醒调度器 - 未读重要通知存在期间按间隔重复提醒
//!
//! # 状态机
//! - `Idle`：没有未读重要通知
//! - `Armed`：定时器已设置，等待唤醒
//! - `Firing`：定时器到期，正在发出提醒
//!
//! 状态不持久化；进程重启后由当前未读数重新推导（>0 则以完整间隔重新布防），
//! 因此重启最多把一次已到期的提醒推迟一个间隔。
//!
//! [`ReAlertMachine`] 是纯状态机，只产出动作；[`ReAlertScheduler`] 负责在
//! tokio 上执行这些动作（定时器、提醒渠道）。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{AlertKind, SummaryAlert};
use super::dispatcher::AlertDispatcher;
use super::summary::{SummaryAggregator, UnreadSummary};
use crate::config::ConfigStore;
use crate::error::{ErrorSignal, HubError};

/// 精确定时不可用时允许的额外延迟
pub const INEXACT_SLACK: Duration = Duration::from_secs(60);

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { wake_at: Instant },
    Firing,
}

/// 状态机产出的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAction {
    /// 设置（或替换）定时器
    Arm { wake_at: Instant },
    CancelTimer,
    /// 发出重提醒
    PostReAlert,
    /// 撤销汇总提醒
    CancelSummary,
}

/// 重提醒状态机
#[derive(Debug, Clone)]
pub struct ReAlertMachine {
    state: SchedulerState,
}

impl ReAlertMachine {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// 启动时由当前未读数推导状态
    pub fn restore(&mut self, count: usize, now: Instant, interval: Duration) -> Vec<SchedulerAction> {
        if count > 0 {
            self.arm(now, interval)
        } else {
            self.state = SchedulerState::Idle;
            Vec::new()
        }
    }

    /// 未读重要数变化
    pub fn on_count_changed(
        &mut self,
        count: usize,
        now: Instant,
        interval: Duration,
    ) -> Vec<SchedulerAction> {
        match (self.state, count) {
            (SchedulerState::Idle, 0) => Vec::new(),
            (SchedulerState::Idle, _) => self.arm(now, interval),
            (_, 0) => self.on_all_read(),
            // 已布防时新增通知不重置定时器
            _ => Vec::new(),
        }
    }

    /// 定时器到期；`count` 为重新计算后的未读数
    ///
    /// 仍有未读时进入 `Firing` 并要求发出提醒，随后由 [`Self::finish_firing`] 重新布防。
    pub fn on_wake(&mut self, count: usize) -> Vec<SchedulerAction> {
        match self.state {
            SchedulerState::Armed { .. } if count > 0 => {
                self.state = SchedulerState::Firing;
                vec![SchedulerAction::PostReAlert]
            }
            SchedulerState::Armed { .. } => self.on_all_read(),
            // 过期的唤醒
            SchedulerState::Idle | SchedulerState::Firing => Vec::new(),
        }
    }

    /// 提醒发出后重新布防
    pub fn finish_firing(&mut self, now: Instant, interval: Duration) -> Vec<SchedulerAction> {
        match self.state {
            SchedulerState::Firing => self.arm(now, interval),
            _ => Vec::new(),
        }
    }

    /// 外部"全部已读"
    pub fn on_all_read(&mut self) -> Vec<SchedulerAction> {
        match self.state {
            SchedulerState::Idle => Vec::new(),
            SchedulerState::Armed { .. } | SchedulerState::Firing => {
                self.state = SchedulerState::Idle;
                vec![SchedulerAction::CancelTimer, SchedulerAction::CancelSummary]
            }
        }
    }

    fn arm(&mut self, now: Instant, interval: Duration) -> Vec<SchedulerAction> {
        let wake_at = now + interval;
        self.state = SchedulerState::Armed { wake_at };
        vec![SchedulerAction::Arm { wake_at }]
    }
}

impl Default for ReAlertMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 宿主定时权限
pub trait TimerPermission: Send + Sync {
    /// 是否允许精确定时
    fn exact_allowed(&self) -> bool;
}

/// 总是允许精确定时
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactTimers;

impl TimerPermission for ExactTimers {
    fn exact_allowed(&self) -> bool {
        true
    }
}

/// 重提醒调度器
pub struct ReAlertScheduler {
    summary: Arc<SummaryAggregator>,
    dispatcher: Arc<AlertDispatcher>,
    config: Arc<ConfigStore>,
    permission: Arc<dyn TimerPermission>,
    errors: ErrorSignal,
    state_tx: watch::Sender<SchedulerState>,
}

impl ReAlertScheduler {
    pub fn new(
        summary: Arc<SummaryAggregator>,
        dispatcher: Arc<AlertDispatcher>,
        config: Arc<ConfigStore>,
        errors: ErrorSignal,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            summary,
            dispatcher,
            config,
            permission: Arc::new(ExactTimers),
            errors,
            state_tx,
        }
    }

    /// 设置定时权限来源
    pub fn with_timer_permission(mut self, permission: Arc<dyn TimerPermission>) -> Self {
        self.permission = permission;
        self
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// 当前配置的重提醒间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.config.re_alert_interval()) * 60)
    }

    /// 在后台运行，直到 `shutdown` 变为 true 或发送端被释放
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut summary_rx = self.summary.subscribe();
        let mut machine = ReAlertMachine::new();
        let mut deadline: Option<Instant> = None;
        let mut exact_denied_reported = false;

        let initial = summary_rx.borrow_and_update().clone();
        let actions = machine.restore(initial.count(), Instant::now(), self.interval());
        info!(count = initial.count(), state = ?machine.state(), "Re-alert scheduler started");
        self.post_refresh(&initial);
        self.apply(&actions, &initial, &mut deadline, &mut exact_denied_reported);
        self.publish(&machine);

        loop {
            let wake = deadline;
            let timer = async move {
                match wake {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                res = summary_rx.changed() => {
                    if res.is_err() {
                        debug!("Summary feed closed");
                        break;
                    }
                    let snapshot = summary_rx.borrow_and_update().clone();
                    let actions =
                        machine.on_count_changed(snapshot.count(), Instant::now(), self.interval());
                    self.post_refresh(&snapshot);
                    self.apply(&actions, &snapshot, &mut deadline, &mut exact_denied_reported);
                    self.publish(&machine);
                }
                _ = timer => {
                    deadline = None;
                    self.summary.refresh_blocking().await;
                    let snapshot = UnreadSummary {
                        records: self.summary.unread_important(),
                    };
                    let actions = machine.on_wake(snapshot.count());
                    self.publish(&machine);
                    self.apply(&actions, &snapshot, &mut deadline, &mut exact_denied_reported);

                    let actions = machine.finish_firing(Instant::now(), self.interval());
                    self.apply(&actions, &snapshot, &mut deadline, &mut exact_denied_reported);
                    self.publish(&machine);
                }
            }
        }

        info!("Re-alert scheduler stopped");
    }

    fn apply(
        &self,
        actions: &[SchedulerAction],
        snapshot: &UnreadSummary,
        deadline: &mut Option<Instant>,
        exact_denied_reported: &mut bool,
    ) {
        for action in actions {
            match *action {
                SchedulerAction::Arm { wake_at } => {
                    let at = if self.permission.exact_allowed() {
                        wake_at
                    } else {
                        if !*exact_denied_reported {
                            *exact_denied_reported = true;
                            self.errors.report(
                                "realert",
                                HubError::SchedulerPermissionDenied(
                                    "exact timers unavailable, using inexact wake".into(),
                                ),
                            );
                        }
                        wake_at + INEXACT_SLACK
                    };
                    debug!(in_secs = at.saturating_duration_since(Instant::now()).as_secs(), "Re-alert armed");
                    *deadline = Some(at);
                }
                SchedulerAction::CancelTimer => {
                    debug!("Re-alert timer cancelled");
                    *deadline = None;
                }
                SchedulerAction::PostReAlert => {
                    let silent = self.config.silent_mode();
                    match SummaryAlert::from_unread(&snapshot.records, silent, AlertKind::ReAlert) {
                        Some(alert) => {
                            info!(count = alert.count, silent, "Re-alerting unread important notifications");
                            self.dispatcher.post_summary(&alert);
                        }
                        None => warn!("Re-alert fired with empty summary"),
                    }
                }
                SchedulerAction::CancelSummary => self.dispatcher.cancel_summary(),
            }
        }
    }

    /// 未读变化时静默刷新汇总内容
    fn post_refresh(&self, snapshot: &UnreadSummary) {
        if let Some(alert) = SummaryAlert::from_unread(&snapshot.records, true, AlertKind::Refresh) {
            self.dispatcher.post_summary(&alert);
        }
    }

    fn publish(&self, machine: &ReAlertMachine) {
        self.state_tx.send_if_modified(|state| {
            if *state == machine.state() {
                false
            } else {
                *state = machine.state();
                true
            }
        });
    }
}
