//! 终端渠道 - 将汇总提醒打印到标准输出

use anyhow::Result;
use std::io::Write;

use crate::notification::channel::{AlertKind, AlertSurface, SendResult, SummaryAlert};

/// 终端渠道
#[derive(Debug, Default)]
pub struct ConsoleSurface;

impl ConsoleSurface {
    pub fn new() -> Self {
        Self
    }
}

/// 单行渲染
pub fn render_alert(alert: &SummaryAlert) -> String {
    let marker = match (alert.kind, alert.silent) {
        (AlertKind::ReAlert, false) => "\x07🔔",
        (AlertKind::ReAlert, true) => "🔔",
        (AlertKind::Refresh, _) => "•",
    };
    format!("{} {} | {}", marker, alert.title, alert.body)
}

impl AlertSurface for ConsoleSurface {
    fn name(&self) -> &str {
        "console"
    }

    fn post_summary(&self, alert: &SummaryAlert) -> Result<SendResult> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", render_alert(alert))?;
        stdout.flush()?;
        Ok(SendResult::Sent)
    }

    fn cancel_summary(&self) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "✓ No unread important notifications")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_alert() {
        let mut alert = SummaryAlert {
            title: "1 important notification".into(),
            body: "Bank: OTP".into(),
            count: 1,
            silent: true,
            kind: AlertKind::ReAlert,
        };
        assert_eq!(render_alert(&alert), "🔔 1 important notification | Bank: OTP");

        alert.silent = false;
        assert!(render_alert(&alert).starts_with('\x07'));

        alert.kind = AlertKind::Refresh;
        assert!(render_alert(&alert).starts_with('•'));
    }
}
