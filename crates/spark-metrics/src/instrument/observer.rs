//! Observer 仪表：由采集方在回调中上报当前值。
//!
//! 回调以类型擦除的 `Arc<dyn ObserverCallback>` 存放在仪表本体中，
//! [`crate::Meter::run_observers`] 在不持有注册表锁的情况下逐个调用。

use core::{fmt, marker::PhantomData};
use std::sync::Arc;

use crate::{
    error::Result,
    instrument::{Instrument, InstrumentCore, ObserverKind},
    labels::LabelSet,
    number::MetricNumber,
};

/// 回调内用于上报观测值的句柄。
pub struct ObserverResult<'a, N> {
    core: &'a InstrumentCore,
    _marker: PhantomData<fn(N)>,
}

impl<N: MetricNumber> ObserverResult<'_, N> {
    /// 上报一次观测值，标签处理与 [`Instrument::record`] 一致。
    pub fn observe(&self, value: N, labels: &LabelSet) -> Result<()> {
        self.core.record_value(value, labels)
    }
}

impl<N> fmt::Debug for ObserverResult<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverResult")
            .field("instrument", &self.core.name())
            .finish()
    }
}

pub(crate) trait ObserverCallback: Send + Sync {
    fn run(&self, core: &InstrumentCore);
}

struct TypedCallback<N, F> {
    callback: F,
    _marker: PhantomData<fn(N)>,
}

impl<N, F> ObserverCallback for TypedCallback<N, F>
where
    N: MetricNumber,
    F: Fn(&ObserverResult<'_, N>) + Send + Sync + 'static,
{
    fn run(&self, core: &InstrumentCore) {
        let result = ObserverResult {
            core,
            _marker: PhantomData,
        };
        (self.callback)(&result);
    }
}

impl<N: MetricNumber> Instrument<N, ObserverKind> {
    /// 注册（或替换）采集回调。
    ///
    /// 回调在调用 [`crate::Meter::run_observers`] 的线程上同步执行；
    /// 回调内可以构建其他仪表，但不应再次触发 `run_observers`。
    ///
    /// # 风险提示（Trade-offs）
    /// - 上报只需使用回调参数 [`ObserverResult`]；回调若捕获本仪表（或其克隆），
    ///   会形成“仪表核心 → 回调 → 仪表核心”的 `Arc` 环，该仪表在 Meter 释放后也不会被回收。
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&ObserverResult<'_, N>) + Send + Sync + 'static,
    {
        self.core().replace_callback(Arc::new(TypedCallback {
            callback,
            _marker: PhantomData,
        }));
    }

    /// 是否已注册回调。
    pub fn has_callback(&self) -> bool {
        self.core().callback().is_some()
    }
}
