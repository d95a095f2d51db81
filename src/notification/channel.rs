//! 提醒渠道 trait 定义

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::record::NotificationRecord;

/// 汇总提醒的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// 未读数变化时刷新汇总
    Refresh,
    /// 定时重提醒
    ReAlert,
}

/// 汇总提醒
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryAlert {
    pub title: String,
    pub body: String,
    /// 未读重要通知数
    pub count: usize,
    /// 静默（不响铃、不振动）
    pub silent: bool,
    pub kind: AlertKind,
}

impl SummaryAlert {
    /// 由未读重要通知（时间倒序）生成汇总；为空时返回 None
    pub fn from_unread(records: &[NotificationRecord], silent: bool, kind: AlertKind) -> Option<Self> {
        let newest = records.first()?;
        Some(Self {
            title: format_summary_title(records.len()),
            body: format_summary_body(newest),
            count: records.len(),
            silent,
            kind,
        })
    }
}

/// "1 important notification" / "N important notifications"
pub fn format_summary_title(count: usize) -> String {
    if count == 1 {
        "1 important notification".to_string()
    } else {
        format!("{count} important notifications")
    }
}

/// "<来源名>: <标题>"，标题为空时使用正文
pub fn format_summary_body(record: &NotificationRecord) -> String {
    let text = if record.title.is_empty() {
        &record.body
    } else {
        &record.title
    };
    format!("{}: {}", record.source_name, text)
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 宿主提醒界面
pub trait AlertSurface: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 发布或替换汇总提醒
    fn post_summary(&self, alert: &SummaryAlert) -> Result<SendResult>;

    /// 撤销当前汇总提醒
    fn cancel_summary(&self) -> Result<()>;
}
