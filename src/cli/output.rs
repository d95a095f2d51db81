//! Output formatting for CLI commands

use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::notification::NotificationRecord;

/// Format output as pretty JSON
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// 本地时间显示
pub fn format_timestamp(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

/// 单条记录的一行摘要
pub fn format_record_line(record: &NotificationRecord) -> String {
    let marker = match (record.is_important, record.is_read) {
        (true, false) => "★",
        (true, true) => "☆",
        (false, _) => " ",
    };
    let text = match (record.title.is_empty(), record.body.is_empty()) {
        (false, false) => format!("{} - {}", record.title, record.body),
        (false, true) => record.title.clone(),
        _ => record.body.clone(),
    };
    format!(
        "{} #{:<5} {}  {}: {}",
        marker,
        record.id,
        format_timestamp(record.timestamp),
        record.source_name,
        truncate(&text, 80)
    )
}

/// 按字符截断
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// 打印记录列表
pub fn print_records(records: &[NotificationRecord], json: bool) {
    if json {
        println!("{}", format_output(&records));
        return;
    }
    if records.is_empty() {
        println!("No notifications");
        return;
    }
    for record in records {
        println!("{}", format_record_line(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long message", 10), "this is...");
        assert_eq!(truncate("通知通知通知通知", 5), "通知...");
    }

    #[test]
    fn test_record_line_marks_unread_important() {
        let record = NotificationRecord {
            id: 7,
            source_id: "com.bank".into(),
            source_name: "Bank".into(),
            title: "OTP".into(),
            body: "123456".into(),
            timestamp: 0,
            is_read: false,
            is_important: true,
            icon: None,
        };
        let line = format_record_line(&record);
        assert!(line.starts_with("★ #7"));
        assert!(line.ends_with("Bank: OTP - 123456"));
    }
}
