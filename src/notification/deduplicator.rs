//! 通知去重器 - 在读取展示列表时折叠短时间内的重复通知
//!
//! 系统重复推送同一条通知时，展示列表会被刷屏。去重只作用于读取结果，
//! 存储中仍保留每一条原始记录。
//!
//! ## 去重策略
//! 1. 按 `(source_id, title, body)` 精确分组
//! 2. 组内从最早的一条开始折叠：与上一条 *保留* 记录的间隔超过窗口才保留，
//!    因此一串连发只留下第一条
//! 3. 默认窗口 5000 毫秒
//! 4. 输出整体按时间倒序

use std::time::Duration;
use tracing::debug;

use super::record::NotificationRecord;

/// 默认去重窗口（毫秒）
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 5000;

/// 通知去重器
#[derive(Debug, Clone, Copy)]
pub struct NotificationDeduplicator {
    /// 去重窗口（毫秒）
    window_ms: u64,
}

impl NotificationDeduplicator {
    /// 创建新的去重器，使用默认 5 秒窗口
    pub fn new() -> Self {
        Self {
            window_ms: DEFAULT_DEDUP_WINDOW_MS,
        }
    }

    /// 设置去重窗口时长
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 对记录去重
    ///
    /// 输入顺序无要求；结果按时间倒序（同一时间按 id 倒序），幂等。
    /// 同一时间戳的重复记录以 id 较小者为准。
    pub fn dedupe(&self, mut records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
        let input_len = records.len();

        // 同组记录相邻且组内按时间正序，`kept` 末尾即本组上一条保留记录
        records.sort_by(|a, b| {
            a.dedup_key()
                .cmp(&b.dedup_key())
                .then(a.timestamp.cmp(&b.timestamp))
                .then(a.id.cmp(&b.id))
        });

        let mut kept: Vec<NotificationRecord> = Vec::with_capacity(input_len);
        for record in records {
            let keep = match kept.last() {
                Some(prev) if prev.dedup_key() == record.dedup_key() => {
                    record.timestamp.abs_diff(prev.timestamp) > self.window_ms
                }
                _ => true,
            };
            if keep {
                kept.push(record);
            }
        }

        sort_newest_first(&mut kept);

        if kept.len() < input_len {
            debug!(
                before = input_len,
                after = kept.len(),
                "Duplicate notifications collapsed"
            );
        }
        kept
    }
}

impl Default for NotificationDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

/// 使用默认窗口去重
pub fn dedupe(records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
    NotificationDeduplicator::new().dedupe(records)
}

fn sort_newest_first(records: &mut [NotificationRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, source: &str, title: &str, body: &str, ts: i64) -> NotificationRecord {
        NotificationRecord {
            id,
            source_id: source.to_string(),
            source_name: source.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            timestamp: ts,
            is_read: false,
            is_important: false,
            icon: None,
        }
    }

    fn ids(records: &[NotificationRecord]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_burst_within_window_keeps_first() {
        let a = record(1, "X", "Hi", "there", 1000);
        let b = record(2, "X", "Hi", "there", 3000);

        let out = dedupe(vec![a, b]);
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_separated_repeat_is_kept() {
        let a = record(1, "X", "Hi", "there", 1000);
        let b = record(2, "X", "Hi", "there", 3000);
        let c = record(3, "X", "Hi", "there", 9000);

        let out = dedupe(vec![c, b, a]);
        assert_eq!(ids(&out), vec![3, 1]);
    }

    #[test]
    fn test_gap_is_measured_from_last_kept_record() {
        // 0 保留；4000 丢弃；6000 距 0 超过窗口保留；9000 距 6000 丢弃
        let out = dedupe(vec![
            record(1, "X", "t", "b", 0),
            record(2, "X", "t", "b", 4000),
            record(3, "X", "t", "b", 6000),
            record(4, "X", "t", "b", 9000),
        ]);
        assert_eq!(ids(&out), vec![3, 1]);
    }

    #[test]
    fn test_exact_window_gap_is_collapsed() {
        let out = dedupe(vec![
            record(1, "X", "t", "b", 0),
            record(2, "X", "t", "b", 5000),
        ]);
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn test_different_keys_are_independent() {
        let out = dedupe(vec![
            record(1, "X", "t", "b", 1000),
            record(2, "Y", "t", "b", 1001),
            record(3, "X", "t2", "b", 1002),
            record(4, "X", "t", "b2", 1003),
        ]);
        assert_eq!(ids(&out), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_idempotent() {
        let input = vec![
            record(1, "X", "t", "b", 0),
            record(2, "X", "t", "b", 1000),
            record(3, "X", "t", "b", 7000),
            record(4, "X", "t", "b", 8000),
            record(5, "Y", "t", "b", 8000),
            record(6, "X", "t", "b", 20000),
        ];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_sorted_newest_first() {
        let out = dedupe(vec![
            record(1, "A", "t", "b", 10),
            record(2, "B", "t", "b", 30),
            record(3, "C", "t", "b", 20),
        ]);
        assert_eq!(ids(&out), vec![2, 3, 1]);
    }

    #[test]
    fn test_custom_window() {
        let dedup = NotificationDeduplicator::new().with_window(Duration::from_millis(100));
        let out = dedup.dedupe(vec![
            record(1, "X", "t", "b", 0),
            record(2, "X", "t", "b", 500),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let out = dedupe(vec![
            record(1, "X", "t", "b", i64::MIN),
            record(2, "X", "t", "b", i64::MAX),
            record(3, "X", "t", "b", i64::MAX - 1),
        ]);
        assert_eq!(ids(&out), vec![3, 1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
