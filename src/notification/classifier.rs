//! 重要性分类器 - 根据来源偏好判定通知是否重要

use std::sync::Arc;
use tracing::debug;

use super::store::EventStore;
use crate::error::ErrorSignal;

/// 重要性分类器
///
/// 只读本地状态，同步完成；未登记的来源一律视为不重要。
#[derive(Clone)]
pub struct Classifier {
    store: Arc<dyn EventStore>,
    errors: ErrorSignal,
}

impl Classifier {
    pub fn new(store: Arc<dyn EventStore>, errors: ErrorSignal) -> Self {
        Self { store, errors }
    }

    /// 判定来源是否重要
    ///
    /// 存储读取失败时按不重要处理，并上报错误信号。
    pub fn classify(&self, source_id: &str) -> bool {
        match self.store.preference(source_id) {
            Ok(Some(pref)) => pref.is_important,
            Ok(None) => false,
            Err(e) => {
                debug!(source_id, error = %e, "Preference lookup failed, defaulting to not important");
                self.errors.report("classifier", e);
                false
            }
        }
    }
}
