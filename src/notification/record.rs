//! 通知记录与来源偏好的数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 图标大小上限，超出则丢弃图标
pub const MAX_ICON_BYTES: usize = 64 * 1024;

/// 已存储的通知记录
///
/// 创建后除 `is_read` 外不可变；`is_important` 在采集时由分类器决定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// 自增代理键
    pub id: i64,
    pub source_id: String,
    pub source_name: String,
    pub title: String,
    pub body: String,
    /// 采集时间（Unix 毫秒）
    pub timestamp: i64,
    pub is_read: bool,
    pub is_important: bool,
    #[serde(default, skip_serializing)]
    pub icon: Option<Vec<u8>>,
}

impl NotificationRecord {
    pub fn captured_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// 去重分组键
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.source_id, &self.title, &self.body)
    }
}

/// 待写入的新记录（id 由存储分配）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub source_id: String,
    pub source_name: String,
    pub title: String,
    pub body: String,
    pub timestamp: i64,
    pub is_important: bool,
    pub icon: Option<Vec<u8>>,
}

impl NewNotification {
    pub fn new(
        source_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let source_id = source_id.into();
        Self {
            source_name: source_id.clone(),
            source_id,
            title: title.into(),
            body: body.into(),
            timestamp,
            is_important: false,
            icon: None,
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn important(mut self, is_important: bool) -> Self {
        self.is_important = is_important;
        self
    }

    /// 设置图标；超过 [`MAX_ICON_BYTES`] 的图标被丢弃
    pub fn with_icon(mut self, icon: Option<Vec<u8>>) -> Self {
        self.icon = icon.filter(|bytes| bytes.len() <= MAX_ICON_BYTES);
        self
    }
}

/// 来源重要性偏好，每个 source_id 至多一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePreference {
    pub source_id: String,
    pub display_name: String,
    pub is_important: bool,
}

impl SourcePreference {
    pub fn new(source_id: impl Into<String>, display_name: impl Into<String>, is_important: bool) -> Self {
        Self {
            source_id: source_id.into(),
            display_name: display_name.into(),
            is_important,
        }
    }
}
