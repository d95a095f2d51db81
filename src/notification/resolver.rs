//! 来源解析 - 获取来源显示名与图标（外部协作方接口）

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::HubError;

use super::store::EventStore;

/// 解析出的来源信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub display_name: String,
    pub icon: Option<Vec<u8>>,
}

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedSource),
    NotFound,
}

/// 来源解析器
pub trait SourceResolver: Send + Sync {
    /// 解析来源；`Err` 表示解析器本身不可用
    fn resolve(&self, source_id: &str) -> Result<Resolution, HubError>;
}

/// 总是返回 NotFound 的解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl SourceResolver for NullResolver {
    fn resolve(&self, _source_id: &str) -> Result<Resolution, HubError> {
        Ok(Resolution::NotFound)
    }
}

/// 基于内存映射的解析器
#[derive(Debug, Default)]
pub struct MapResolver {
    entries: RwLock<HashMap<String, ResolvedSource>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source_id: impl Into<String>, display_name: impl Into<String>, icon: Option<Vec<u8>>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                source_id.into(),
                ResolvedSource {
                    display_name: display_name.into(),
                    icon,
                },
            );
        }
    }
}

impl SourceResolver for MapResolver {
    fn resolve(&self, source_id: &str) -> Result<Resolution, HubError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| HubError::ResolverUnavailable("resolver lock poisoned".into()))?;
        Ok(entries
            .get(source_id)
            .cloned()
            .map_or(Resolution::NotFound, Resolution::Found))
    }
}

/// 用已登记的来源偏好显示名做解析（无图标）
pub struct PreferenceResolver {
    store: Arc<dyn EventStore>,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

impl SourceResolver for PreferenceResolver {
    fn resolve(&self, source_id: &str) -> Result<Resolution, HubError> {
        match self.store.preference(source_id) {
            Ok(Some(pref)) => Ok(Resolution::Found(ResolvedSource {
                display_name: pref.display_name,
                icon: None,
            })),
            Ok(None) => Ok(Resolution::NotFound),
            Err(e) => Err(HubError::ResolverUnavailable(e.to_string())),
        }
    }
}
