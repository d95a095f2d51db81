//! 事件存储 - SQLite 持久化的通知记录与来源偏好
//!
//! 单写者：所有写操作在连接互斥锁内以事务提交，每次成功的变更都会递增
//! 变更版本号并通过 `watch` 通道发布，实时视图据此重新查询。

use crate::error::{HubError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::record::{NewNotification, NotificationRecord, SourcePreference};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    source_name TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    is_important INTEGER NOT NULL DEFAULT 0,
    icon BLOB
);

CREATE INDEX IF NOT EXISTS idx_notifications_timestamp ON notifications(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_notifications_unread_important
    ON notifications(is_important, is_read, timestamp DESC);

CREATE TABLE IF NOT EXISTS source_preferences (
    source_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    is_important INTEGER NOT NULL DEFAULT 0
);
";

const SELECT_COLUMNS: &str =
    "SELECT id, source_id, source_name, title, body, timestamp, is_read, is_important, icon
     FROM notifications";

/// 记录查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordQuery {
    All,
    Important,
    /// 非重要记录
    Other,
    UnreadImportant,
    /// 对 source_id / 来源名 / 标题 / 正文做子串匹配
    Search(String),
    /// 闭区间 [start, end]，Unix 毫秒
    DateRange { start: i64, end: i64 },
}

/// 事件存储的查询/命令接口
pub trait EventStore: Send + Sync {
    /// 原子追加一条记录
    fn insert(&self, new: NewNotification) -> Result<NotificationRecord>;

    fn get(&self, id: i64) -> Result<Option<NotificationRecord>>;

    /// 按查询返回记录，时间倒序
    fn query(&self, query: &RecordQuery) -> Result<Vec<NotificationRecord>>;

    fn count(&self) -> Result<usize>;

    fn unread_important_count(&self) -> Result<usize>;

    /// 标记已读；id 不存在时返回 false
    fn mark_read(&self, id: i64) -> Result<bool>;

    /// 将所有未读重要记录标记已读，返回受影响条数
    fn mark_all_important_read(&self) -> Result<usize>;

    /// 删除 timestamp < cutoff 的记录
    fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize>;

    /// 只保留最新的 keep 条记录
    fn keep_newest(&self, keep: usize) -> Result<usize>;

    /// 清空全部记录
    fn clear_all(&self) -> Result<usize>;

    fn preference(&self, source_id: &str) -> Result<Option<SourcePreference>>;

    fn upsert_preference(&self, preference: &SourcePreference) -> Result<()>;

    /// 首次见到来源时登记（非重要）；已存在则不变，返回是否新建
    fn register_source(&self, source_id: &str, display_name: &str) -> Result<bool>;

    fn preferences(&self) -> Result<Vec<SourcePreference>>;

    /// 标记为重要的来源数
    fn important_source_count(&self) -> Result<usize>;

    /// 所有偏好重置为非重要（保留行）
    fn reset_preferences(&self) -> Result<usize>;

    /// 订阅变更版本号
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// 检查是否有其他进程提交了变更；有则递增版本号并返回 true
    fn poll_external_changes(&self) -> Result<bool> {
        Ok(false)
    }
}

/// SQLite 存储
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: watch::Sender<u64>,
    /// 最近一次看到的 `PRAGMA data_version`
    data_version: AtomicI64,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

impl SqliteStore {
    /// 默认数据库路径
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notification-hub")
            .join("notifications.db")
    }

    pub fn open_default() -> Result<Self> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| HubError::StorageWrite(format!("Failed to set WAL mode: {e}")))?;
        conn.busy_timeout(Duration::from_millis(250))?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "Notification store opened");
        Self::with_connection(conn)
    }

    /// 内存数据库（测试用）
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let data_version = read_data_version(&conn)?;
        let (changes, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            data_version: AtomicI64::new(data_version),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HubError::StorageWrite("connection lock poisoned".into()))
    }

    fn bump(&self) {
        self.changes.send_modify(|rev| *rev += 1);
    }

    fn read_records(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<NotificationRecord>> {
        let mut stmt = conn.prepare(sql).map_err(HubError::from_read)?;
        let records = stmt
            .query_map(params, row_to_record)
            .map_err(HubError::from_read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(HubError::from_read)?;
        Ok(records)
    }

    fn count_where(&self, clause: &str) -> Result<usize> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM notifications {clause}");
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(HubError::from_read)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl EventStore for SqliteStore {
    fn insert(&self, new: NewNotification) -> Result<NotificationRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(HubError::from_write)?;
        tx.execute(
            "INSERT INTO notifications
             (source_id, source_name, title, body, timestamp, is_read, is_important, icon)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                new.source_id,
                new.source_name,
                new.title,
                new.body,
                new.timestamp,
                i32::from(new.is_important),
                new.icon,
            ],
        )
        .map_err(HubError::from_write)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(HubError::from_write)?;
        drop(conn);

        debug!(id, source_id = %new.source_id, important = new.is_important, "Notification stored");
        self.bump();

        Ok(NotificationRecord {
            id,
            source_id: new.source_id,
            source_name: new.source_name,
            title: new.title,
            body: new.body,
            timestamp: new.timestamp,
            is_read: false,
            is_important: new.is_important,
            icon: new.icon,
        })
    }

    fn get(&self, id: i64) -> Result<Option<NotificationRecord>> {
        let conn = self.lock()?;
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        conn.query_row(&sql, params![id], row_to_record)
            .optional()
            .map_err(HubError::from_read)
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<NotificationRecord>> {
        let conn = self.lock()?;
        const ORDER: &str = "ORDER BY timestamp DESC, id DESC";

        match query {
            RecordQuery::All => {
                Self::read_records(&conn, &format!("{SELECT_COLUMNS} {ORDER}"), &[])
            }
            RecordQuery::Important => Self::read_records(
                &conn,
                &format!("{SELECT_COLUMNS} WHERE is_important = 1 {ORDER}"),
                &[],
            ),
            RecordQuery::Other => Self::read_records(
                &conn,
                &format!("{SELECT_COLUMNS} WHERE is_important = 0 {ORDER}"),
                &[],
            ),
            RecordQuery::UnreadImportant => Self::read_records(
                &conn,
                &format!("{SELECT_COLUMNS} WHERE is_important = 1 AND is_read = 0 {ORDER}"),
                &[],
            ),
            RecordQuery::Search(text) => {
                let pattern = format!("%{}%", escape_like_pattern(text));
                Self::read_records(
                    &conn,
                    &format!(
                        "{SELECT_COLUMNS} WHERE source_id LIKE ?1 ESCAPE '\\'
                           OR source_name LIKE ?1 ESCAPE '\\'
                           OR title LIKE ?1 ESCAPE '\\'
                           OR body LIKE ?1 ESCAPE '\\' {ORDER}"
                    ),
                    &[&pattern as &dyn rusqlite::ToSql],
                )
            }
            RecordQuery::DateRange { start, end } => Self::read_records(
                &conn,
                &format!("{SELECT_COLUMNS} WHERE timestamp BETWEEN ?1 AND ?2 {ORDER}"),
                &[start as &dyn rusqlite::ToSql, end],
            ),
        }
    }

    fn count(&self) -> Result<usize> {
        self.count_where("")
    }

    fn unread_important_count(&self) -> Result<usize> {
        self.count_where("WHERE is_important = 1 AND is_read = 0")
    }

    fn mark_read(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                params![id],
            )
            .map_err(HubError::from_write)?;
        drop(conn);

        if updated == 0 {
            debug!(id, "Notification not found or already read");
            return Ok(false);
        }
        debug!(id, "Marked notification as read");
        self.bump();
        Ok(true)
    }

    fn mark_all_important_read(&self) -> Result<usize> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE is_important = 1 AND is_read = 0",
                [],
            )
            .map_err(HubError::from_write)?;
        drop(conn);

        if updated > 0 {
            info!(count = updated, "Marked important notifications as read");
            self.bump();
        }
        Ok(updated)
    }

    fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM notifications WHERE timestamp < ?1",
                params![cutoff_ms],
            )
            .map_err(HubError::from_write)?;
        drop(conn);

        if deleted > 0 {
            self.bump();
        }
        Ok(deleted)
    }

    fn keep_newest(&self, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM notifications WHERE id NOT IN
                 (SELECT id FROM notifications ORDER BY timestamp DESC, id DESC LIMIT ?1)",
                params![keep],
            )
            .map_err(HubError::from_write)?;
        drop(conn);

        if deleted > 0 {
            self.bump();
        }
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM notifications", [])
            .map_err(HubError::from_write)?;
        drop(conn);

        info!(count = deleted, "Cleared all notifications");
        self.bump();
        Ok(deleted)
    }

    fn preference(&self, source_id: &str) -> Result<Option<SourcePreference>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT source_id, display_name, is_important FROM source_preferences
             WHERE source_id = ?1",
            params![source_id],
            row_to_preference,
        )
        .optional()
        .map_err(HubError::from_read)
    }

    fn upsert_preference(&self, preference: &SourcePreference) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO source_preferences (source_id, display_name, is_important)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(source_id) DO UPDATE SET
                display_name = excluded.display_name,
                is_important = excluded.is_important",
            params![
                preference.source_id,
                preference.display_name,
                i32::from(preference.is_important),
            ],
        )
        .map_err(HubError::from_write)?;
        drop(conn);

        debug!(source_id = %preference.source_id, important = preference.is_important, "Preference saved");
        self.bump();
        Ok(())
    }

    fn register_source(&self, source_id: &str, display_name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO source_preferences (source_id, display_name, is_important)
                 VALUES (?1, ?2, 0)",
                params![source_id, display_name],
            )
            .map_err(HubError::from_write)?;
        drop(conn);

        if inserted > 0 {
            debug!(source_id, "Registered new source");
            self.bump();
        }
        Ok(inserted > 0)
    }

    fn preferences(&self) -> Result<Vec<SourcePreference>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT source_id, display_name, is_important FROM source_preferences
                 ORDER BY display_name COLLATE NOCASE",
            )
            .map_err(HubError::from_read)?;
        let prefs = stmt
            .query_map([], row_to_preference)
            .map_err(HubError::from_read)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(HubError::from_read)?;
        Ok(prefs)
    }

    fn important_source_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM source_preferences WHERE is_important = 1",
                [],
                |row| row.get(0),
            )
            .map_err(HubError::from_read)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn reset_preferences(&self) -> Result<usize> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE source_preferences SET is_important = 0 WHERE is_important = 1",
                [],
            )
            .map_err(HubError::from_write)?;
        drop(conn);

        if updated > 0 {
            self.bump();
        }
        Ok(updated)
    }

    fn poll_external_changes(&self) -> Result<bool> {
        let version = {
            let conn = self.lock()?;
            read_data_version(&conn)?
        };
        if self.data_version.swap(version, Ordering::SeqCst) == version {
            return Ok(false);
        }
        debug!(version, "Store changed by another connection");
        self.bump();
        Ok(true)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

/// 转义 SQL LIKE 特殊字符（%、_、\）
pub fn escape_like_pattern(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// 其他连接每提交一次事务该值就会变化；本连接自己的提交不影响它
fn read_data_version(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA data_version", [], |row| row.get(0))
        .map_err(HubError::from_read)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_name: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        timestamp: row.get(5)?,
        is_read: row.get::<_, i32>(6)? != 0,
        is_important: row.get::<_, i32>(7)? != 0,
        icon: row.get(8)?,
    })
}

fn row_to_preference(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourcePreference> {
    Ok(SourcePreference {
        source_id: row.get(0)?,
        display_name: row.get(1)?,
        is_important: row.get::<_, i32>(2)? != 0,
    })
}
