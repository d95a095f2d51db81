//! 提醒分发器 - 管理多个提醒渠道并广播汇总

use super::channel::{AlertSurface, SendResult, SummaryAlert};
use std::sync::Arc;
use tracing::{info, warn};

/// 提醒分发器
pub struct AlertDispatcher {
    /// 所有注册的渠道
    surfaces: Vec<Arc<dyn AlertSurface>>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl AlertDispatcher {
    /// 创建新的分发器
    pub fn new() -> Self {
        Self {
            surfaces: Vec::new(),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道
    pub fn register_surface(&mut self, surface: Arc<dyn AlertSurface>) {
        info!(surface = surface.name(), "Registering alert surface");
        self.surfaces.push(surface);
    }

    /// 向所有渠道发布汇总
    pub fn post_summary(&self, alert: &SummaryAlert) -> Vec<(String, SendResult)> {
        let mut results = Vec::with_capacity(self.surfaces.len());

        for surface in &self.surfaces {
            let name = surface.name().to_string();

            if self.dry_run {
                eprintln!("[DRY-RUN] Would post summary to: {} ({})", name, alert.title);
                results.push((name, SendResult::Skipped("dry-run".to_string())));
                continue;
            }

            let result = match surface.post_summary(alert) {
                Ok(r) => r,
                Err(e) => {
                    warn!(surface = %name, error = %e, "Alert surface post failed");
                    SendResult::Failed(e.to_string())
                }
            };

            results.push((name, result));
        }

        results
    }

    /// 撤销所有渠道的汇总
    pub fn cancel_summary(&self) {
        if self.dry_run {
            return;
        }
        for surface in &self.surfaces {
            if let Err(e) = surface.cancel_summary() {
                warn!(surface = surface.name(), error = %e, "Alert surface cancel failed");
            }
        }
    }

    /// 获取已注册的渠道名称
    pub fn surface_names(&self) -> Vec<&str> {
        self.surfaces.iter().map(|s| s.name()).collect()
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::channel::AlertKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 测试用的 mock 渠道
    struct MockSurface {
        name: String,
        posts: AtomicUsize,
        cancels: AtomicUsize,
        fail: bool,
    }

    impl MockSurface {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                posts: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }
    }

    impl AlertSurface for MockSurface {
        fn name(&self) -> &str {
            &self.name
        }

        fn post_summary(&self, _alert: &SummaryAlert) -> anyhow::Result<SendResult> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("surface unavailable");
            }
            Ok(SendResult::Sent)
        }

        fn cancel_summary(&self) -> anyhow::Result<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn alert() -> SummaryAlert {
        SummaryAlert {
            title: "1 important notification".into(),
            body: "Bank: OTP".into(),
            count: 1,
            silent: true,
            kind: AlertKind::ReAlert,
        }
    }

    #[test]
    fn test_dispatcher_register_surface() {
        let mut dispatcher = AlertDispatcher::new();
        assert!(dispatcher.surface_names().is_empty());

        dispatcher.register_surface(Arc::new(MockSurface::new("test")));
        assert_eq!(dispatcher.surface_names(), vec!["test"]);
    }

    #[test]
    fn test_dispatcher_post_and_cancel() {
        let mut dispatcher = AlertDispatcher::new();
        let surface = Arc::new(MockSurface::new("test"));
        dispatcher.register_surface(surface.clone());

        let results = dispatcher.post_summary(&alert());
        assert_eq!(results, vec![("test".to_string(), SendResult::Sent)]);

        dispatcher.cancel_summary();
        assert_eq!(surface.posts.load(Ordering::SeqCst), 1);
        assert_eq!(surface.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_surface_does_not_block_others() {
        let mut dispatcher = AlertDispatcher::new();
        let good = Arc::new(MockSurface::new("good"));
        dispatcher.register_surface(Arc::new(MockSurface::failing("bad")));
        dispatcher.register_surface(good.clone());

        let results = dispatcher.post_summary(&alert());
        assert!(matches!(results[0].1, SendResult::Failed(_)));
        assert_eq!(results[1].1, SendResult::Sent);
        assert_eq!(good.posts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatcher_dry_run() {
        let mut dispatcher = AlertDispatcher::new().with_dry_run(true);
        let surface = Arc::new(MockSurface::new("test"));
        dispatcher.register_surface(surface.clone());

        let results = dispatcher.post_summary(&alert());
        assert_eq!(results[0].1, SendResult::Skipped("dry-run".to_string()));
        assert_eq!(surface.posts.load(Ordering::SeqCst), 0); // 不应该实际发送
    }
}
