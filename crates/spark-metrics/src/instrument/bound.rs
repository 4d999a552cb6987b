//! 绑定表与绑定句柄。
//!
//! # 设计背景（Why）
//! - 高频埋点点位的标签往往固定，预先绑定可以把常量标签合并与哈希查找移出热路径；
//! - 多个调用方可能同时绑定同一标签组合，句柄必须共享并按引用计数回收。
//!
//! # 逻辑解析（How）
//! - 绑定表为 `DashMap<LabelSet, Arc<BoundState>>`，借助 `entry()` 在分片写锁内完成
//!   “查找或插入 + 计数调整”，因此 bind/unbind 对同一 LabelSet 线性一致；
//! - 引用计数只在分片写锁内修改，原子类型仅用于让句柄在锁外读取；
//! - 计数归零时条目被移除并打上 `released` 标记，之后同一标签的 bind 会创建新的身份。

use core::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    error::{MetricsError, Result},
    instrument::{InstrumentCore, KindMarker},
    labels::LabelSet,
    number::MetricNumber,
};

/// 单个绑定的共享状态。
pub(crate) struct BoundState {
    labels: LabelSet,
    merged: LabelSet,
    refs: AtomicUsize,
    released: AtomicBool,
}

impl BoundState {
    fn new(labels: LabelSet, merged: LabelSet) -> Self {
        Self {
            labels,
            merged,
            refs: AtomicUsize::new(1),
            released: AtomicBool::new(false),
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub(crate) struct BindingTable {
    entries: DashMap<LabelSet, Arc<BoundState>>,
}

impl BindingTable {
    /// 查找或创建绑定，并将引用计数加一。
    pub(crate) fn acquire(&self, labels: &LabelSet, constant: &LabelSet) -> Arc<BoundState> {
        match self.entries.entry(labels.clone()) {
            Entry::Occupied(entry) => {
                entry.get().refs.fetch_add(1, Ordering::Relaxed);
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                let state = Arc::new(BoundState::new(labels.clone(), labels.merged_with(constant)));
                entry.insert(Arc::clone(&state));
                state
            }
        }
    }

    /// 释放一次引用，返回剩余计数；句柄已不在表中时返回 `None`。
    pub(crate) fn release(&self, state: &Arc<BoundState>) -> Option<usize> {
        match self.entries.entry(state.labels.clone()) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), state) => {
                let remaining = entry.get().refs.fetch_sub(1, Ordering::Relaxed) - 1;
                if remaining == 0 {
                    entry.get().released.store(true, Ordering::Release);
                    entry.remove();
                }
                Some(remaining)
            }
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 预绑定标签的仪表句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：热路径只做数值校验与一次 Sink 回调，不再合并标签、不再查表；
/// - **契约 (What)**：
///   - 相等性比较句柄身份：同一标签的两次 `bind` 返回相等的句柄，释放后重新绑定得到不相等的新句柄；
///   - `clone` 不增加引用计数，克隆体与原句柄共享同一次绑定；
///   - 引用计数归零后，[`BoundInstrument::record`] 返回 [`MetricsError::BindingReleased`]；
/// - **风险 (Trade-offs)**：与释放并发进行的记录可能已读到“未释放”并完成转发，
///   这是允许的；释放之后才开始的记录一定会失败。
pub struct BoundInstrument<N, K> {
    core: Arc<InstrumentCore>,
    state: Arc<BoundState>,
    _marker: PhantomData<fn() -> (N, K)>,
}

impl<N: MetricNumber, K: KindMarker> BoundInstrument<N, K> {
    pub(crate) fn new(core: Arc<InstrumentCore>, state: Arc<BoundState>) -> Self {
        Self {
            core,
            state,
            _marker: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> &Arc<InstrumentCore> {
        &self.core
    }

    pub(crate) fn state(&self) -> &Arc<BoundState> {
        &self.state
    }

    /// 所属仪表的名称。
    pub fn instrument_name(&self) -> &str {
        self.core.name()
    }

    /// 以绑定的标签记录一次测量。
    ///
    /// # 错误
    /// - absolute Measure 收到负值：[`MetricsError::NegativeValue`]；
    /// - 绑定已被完全释放：[`MetricsError::BindingReleased`]。
    pub fn record(&self, value: N) -> Result<()> {
        self.core.check_value(value)?;
        if self.state.is_released() {
            return Err(MetricsError::BindingReleased {
                instrument: self.instrument_name().to_owned(),
                labels: self.state.labels.to_string(),
            });
        }
        self.core
            .emit(&self.state.merged, &self.state.labels, value.into_value());
        Ok(())
    }

    /// 绑定时由调用方提供的标签。
    pub fn labels(&self) -> &LabelSet {
        &self.state.labels
    }

    /// 合并常量标签后实际转发给 Sink 的标签。
    pub fn effective_labels(&self) -> &LabelSet {
        &self.state.merged
    }

    /// 当前引用计数；已释放的句柄返回 0。
    pub fn ref_count(&self) -> usize {
        self.state.refs.load(Ordering::Relaxed)
    }

    /// 绑定是否已被完全释放。
    pub fn is_released(&self) -> bool {
        self.state.is_released()
    }
}

impl<N, K> Clone for BoundInstrument<N, K> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            state: Arc::clone(&self.state),
            _marker: PhantomData,
        }
    }
}

impl<N, K> PartialEq for BoundInstrument<N, K> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<N, K> Eq for BoundInstrument<N, K> {}

impl<N, K> fmt::Debug for BoundInstrument<N, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundInstrument")
            .field("instrument", &self.core.name())
            .field("labels", &self.state.labels)
            .field("refs", &self.state.refs.load(Ordering::Relaxed))
            .field("released", &self.state.is_released())
            .finish()
    }
}
