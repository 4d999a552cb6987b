//! 按组件名获取或创建 Meter 的注册表。

use core::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::{
    meter::Meter,
    sink::{MetricsSink, NoopSink},
};

/// Meter 注册表。
///
/// # 教案式说明
/// - **意图 (Why)**：不同模块以组件名取用 Meter，无需显式传递实例；
/// - **契约 (What)**：同名多次 [`MeterRegistry::get`] 返回同一 Meter；注册表内所有 Meter 共享同一个 Sink；
/// - **风险 (Trade-offs)**：Meter 一经创建即常驻，直到注册表被丢弃。
pub struct MeterRegistry {
    meters: DashMap<Arc<str>, Meter>,
    sink: Arc<dyn MetricsSink>,
}

impl MeterRegistry {
    /// 以 [`NoopSink`] 创建注册表。
    pub fn new() -> Self {
        Self::with_sink(Arc::new(NoopSink))
    }

    pub fn with_sink(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            meters: DashMap::new(),
            sink,
        }
    }

    /// 进程级默认注册表，使用 [`NoopSink`]。
    pub fn global() -> &'static MeterRegistry {
        static GLOBAL: OnceLock<MeterRegistry> = OnceLock::new();
        GLOBAL.get_or_init(MeterRegistry::new)
    }

    /// 获取或创建指定组件的 Meter。
    pub fn get(&self, name: &str) -> Meter {
        if let Some(meter) = self.meters.get(name) {
            return meter.clone();
        }
        self.meters
            .entry(Arc::from(name))
            .or_insert_with(|| {
                Meter::builder(name)
                    .with_sink(Arc::clone(&self.sink))
                    .build()
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }
}

impl Default for MeterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MeterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterRegistry")
            .field("meters", &self.meters.len())
            .finish_non_exhaustive()
    }
}
