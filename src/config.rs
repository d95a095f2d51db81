//! 配置存储 - 本地 JSON 键值配置
//!
//! 所有键都有文档化的默认值；越界数值会被钳制到合法范围。

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;
use tracing::debug;

pub const DEFAULT_RETENTION_DAYS: u32 = 7;
pub const RETENTION_DAYS_RANGE: (u32, u32) = (1, 30);
pub const DEFAULT_RE_ALERT_INTERVAL_MINUTES: u32 = 15;
pub const RE_ALERT_INTERVAL_RANGE: (u32, u32) = (1, 60);

/// 持久化的配置内容（缺失字段为 None，读取时回落到默认值）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub re_alert_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dnd_behavior: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_granted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_launch: Option<bool>,
}

/// 配置键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    RetentionDays,
    ReAlertInterval,
    SilentMode,
    DndBehavior,
    ListenerGranted,
    FirstLaunch,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 6] = [
        ConfigKey::RetentionDays,
        ConfigKey::ReAlertInterval,
        ConfigKey::SilentMode,
        ConfigKey::DndBehavior,
        ConfigKey::ListenerGranted,
        ConfigKey::FirstLaunch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::RetentionDays => "retention_days",
            ConfigKey::ReAlertInterval => "re_alert_interval",
            ConfigKey::SilentMode => "silent_mode",
            ConfigKey::DndBehavior => "dnd_behavior",
            ConfigKey::ListenerGranted => "listener_granted",
            ConfigKey::FirstLaunch => "first_launch",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = HubError;

    /// 大小写不敏感，忽略下划线和连字符（`reAlertInterval` 与 `re-alert-interval` 等价）
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str().replace('_', "") == normalized)
            .ok_or_else(|| HubError::Config(format!("unknown config key: {s}")))
    }
}

/// 键值配置存储
pub struct ConfigStore {
    path: Option<PathBuf>,
    settings: RwLock<HubSettings>,
}

impl ConfigStore {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notification-hub")
            .join("config.json")
    }

    /// 打开默认位置的配置
    pub fn open_default() -> Result<Self> {
        Self::open(&Self::default_path())
    }

    /// 打开（或创建）指定路径的配置；文件不存在时使用全部默认值
    pub fn open(path: &Path) -> Result<Self> {
        let settings = read_settings(path)?;

        debug!(path = %path.display(), "Config loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            settings: RwLock::new(settings),
        })
    }

    /// 重新读取配置文件，吸收其他进程写入的修改；返回内容是否变化
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let on_disk = read_settings(path)?;

        let mut guard = self
            .settings
            .write()
            .map_err(|_| HubError::Config("config lock poisoned".into()))?;
        if *guard == on_disk {
            return Ok(false);
        }
        *guard = on_disk;
        debug!(path = %path.display(), "Config reloaded");
        Ok(true)
    }

    /// 仅驻留内存的配置（测试用）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            settings: RwLock::new(HubSettings::default()),
        }
    }

    /// 当前配置快照
    pub fn snapshot(&self) -> HubSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn retention_days(&self) -> u32 {
        clamp(
            self.snapshot().retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            RETENTION_DAYS_RANGE,
        )
    }

    /// 重提醒间隔（分钟）
    pub fn re_alert_interval(&self) -> u32 {
        clamp(
            self.snapshot()
                .re_alert_interval
                .unwrap_or(DEFAULT_RE_ALERT_INTERVAL_MINUTES),
            RE_ALERT_INTERVAL_RANGE,
        )
    }

    pub fn silent_mode(&self) -> bool {
        self.snapshot().silent_mode.unwrap_or(true)
    }

    pub fn dnd_behavior(&self) -> bool {
        self.snapshot().dnd_behavior.unwrap_or(false)
    }

    pub fn listener_granted(&self) -> bool {
        self.snapshot().listener_granted.unwrap_or(false)
    }

    pub fn first_launch(&self) -> bool {
        self.snapshot().first_launch.unwrap_or(true)
    }

    pub fn set_retention_days(&self, days: u32) -> Result<()> {
        let days = clamp(days, RETENTION_DAYS_RANGE);
        self.update(|s| s.retention_days = Some(days))
    }

    pub fn set_re_alert_interval(&self, minutes: u32) -> Result<()> {
        let minutes = clamp(minutes, RE_ALERT_INTERVAL_RANGE);
        self.update(|s| s.re_alert_interval = Some(minutes))
    }

    pub fn set_silent_mode(&self, silent: bool) -> Result<()> {
        self.update(|s| s.silent_mode = Some(silent))
    }

    pub fn set_dnd_behavior(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.dnd_behavior = Some(enabled))
    }

    pub fn set_listener_granted(&self, granted: bool) -> Result<()> {
        self.update(|s| s.listener_granted = Some(granted))
    }

    pub fn set_first_launch(&self, first: bool) -> Result<()> {
        self.update(|s| s.first_launch = Some(first))
    }

    /// 按键读取（已应用默认值与钳制）
    pub fn get(&self, key: ConfigKey) -> String {
        match key {
            ConfigKey::RetentionDays => self.retention_days().to_string(),
            ConfigKey::ReAlertInterval => self.re_alert_interval().to_string(),
            ConfigKey::SilentMode => self.silent_mode().to_string(),
            ConfigKey::DndBehavior => self.dnd_behavior().to_string(),
            ConfigKey::ListenerGranted => self.listener_granted().to_string(),
            ConfigKey::FirstLaunch => self.first_launch().to_string(),
        }
    }

    /// 按键写入字符串值
    pub fn set(&self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::RetentionDays => self.set_retention_days(parse_int(key, value)?),
            ConfigKey::ReAlertInterval => self.set_re_alert_interval(parse_int(key, value)?),
            ConfigKey::SilentMode => self.set_silent_mode(parse_bool(key, value)?),
            ConfigKey::DndBehavior => self.set_dnd_behavior(parse_bool(key, value)?),
            ConfigKey::ListenerGranted => self.set_listener_granted(parse_bool(key, value)?),
            ConfigKey::FirstLaunch => self.set_first_launch(parse_bool(key, value)?),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut HubSettings)) -> Result<()> {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| HubError::Config("config lock poisoned".into()))?;

        match &self.path {
            // 在文件锁内基于磁盘最新内容修改，不覆盖其他进程的写入
            Some(path) => *guard = update_file(path, apply)?,
            None => apply(&mut guard),
        }
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<HubSettings> {
    if !path.exists() {
        return Ok(HubSettings::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        Ok(HubSettings::default())
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// 加锁读取、修改、写入临时文件后原子替换，返回写入的内容
fn update_file(path: &Path, apply: impl FnOnce(&mut HubSettings)) -> Result<HubSettings> {
    use fs2::FileExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock_path = path.with_extension("lock");
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    lock.lock_exclusive()?;

    let temp_path = path.with_extension("tmp");
    let result = (|| -> Result<HubSettings> {
        let mut settings = read_settings(path)?;
        apply(&mut settings);
        let file = File::create(&temp_path)?;
        serde_json::to_writer_pretty(&file, &settings)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(settings)
    })();

    lock.unlock()?;
    result
}

fn clamp(value: u32, (min, max): (u32, u32)) -> u32 {
    value.clamp(min, max)
}

fn parse_int(key: ConfigKey, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| HubError::Config(format!("{key} expects an integer, got '{value}'")))
}

fn parse_bool(key: ConfigKey, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(HubError::Config(format!(
            "{key} expects a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ConfigStore::in_memory();
        assert_eq!(config.retention_days(), 7);
        assert_eq!(config.re_alert_interval(), 15);
        assert!(config.silent_mode());
        assert!(!config.dnd_behavior());
        assert!(!config.listener_granted());
        assert!(config.first_launch());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = ConfigStore::in_memory();
        config.set_retention_days(0).unwrap();
        assert_eq!(config.retention_days(), 1);
        config.set_retention_days(365).unwrap();
        assert_eq!(config.retention_days(), 30);
        config.set_re_alert_interval(0).unwrap();
        assert_eq!(config.re_alert_interval(), 1);
        config.set_re_alert_interval(240).unwrap();
        assert_eq!(config.re_alert_interval(), 60);
    }

    #[test]
    fn test_hand_edited_out_of_range_file_is_clamped_on_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"retention_days": 90, "re_alert_interval": 0}"#).unwrap();

        let config = ConfigStore::open(&path).unwrap();
        assert_eq!(config.retention_days(), 30);
        assert_eq!(config.re_alert_interval(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = ConfigStore::open(&path).unwrap();
        config.set_re_alert_interval(30).unwrap();
        config.set_silent_mode(false).unwrap();
        drop(config);

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.re_alert_interval(), 30);
        assert!(!reopened.silent_mode());
        assert_eq!(reopened.retention_days(), 7);
    }

    #[test]
    fn test_key_parsing_accepts_multiple_spellings() {
        assert_eq!(
            "reAlertInterval".parse::<ConfigKey>().unwrap(),
            ConfigKey::ReAlertInterval
        );
        assert_eq!(
            "retention-days".parse::<ConfigKey>().unwrap(),
            ConfigKey::RetentionDays
        );
        assert!("volume".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_generic_set_and_get() {
        let config = ConfigStore::in_memory();
        config.set(ConfigKey::SilentMode, "off").unwrap();
        assert_eq!(config.get(ConfigKey::SilentMode), "false");

        config.set(ConfigKey::RetentionDays, "14").unwrap();
        assert_eq!(config.get(ConfigKey::RetentionDays), "14");

        assert!(config.set(ConfigKey::RetentionDays, "a week").is_err());
        assert!(config.set(ConfigKey::DndBehavior, "maybe").is_err());
    }

    #[test]
    fn test_reload_sees_writes_from_another_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let daemon = ConfigStore::open(&path).unwrap();
        let cli = ConfigStore::open(&path).unwrap();

        cli.set_re_alert_interval(5).unwrap();
        assert_eq!(daemon.re_alert_interval(), 15);
        assert!(daemon.reload().unwrap());
        assert_eq!(daemon.re_alert_interval(), 5);
        assert!(!daemon.reload().unwrap());
    }

    #[test]
    fn test_update_keeps_other_handles_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let daemon = ConfigStore::open(&path).unwrap();
        let cli = ConfigStore::open(&path).unwrap();

        cli.set_silent_mode(false).unwrap();
        daemon.set_listener_granted(true).unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert!(!reopened.silent_mode());
        assert!(reopened.listener_granted());
        assert!(!daemon.silent_mode());
    }

    #[test]
    fn test_in_memory_reload_is_noop() {
        assert!(!ConfigStore::in_memory().reload().unwrap());
    }
}
