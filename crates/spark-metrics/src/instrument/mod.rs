//! 仪表（Instrument）契约与实现。
//!
//! # 设计背景（Why）
//! - 八种仪表（Counter/Gauge/Measure/Observer × long/double）共享同一套“记录 + 绑定”形态，
//!   差异只在数值类型与聚合语义；因此以 `Instrument<N, K>` 泛型表达，`N` 为数值类型，
//!   `K` 为语义标记，避免深层继承体系。
//! - 语义标签 [`InstrumentKind`] 在运行时参与校验分派（absolute 规则只对 Measure 生效），
//!   语义标记 `K` 在编译期限定只属于某类仪表的 API（如 `set_absolute`、`set_callback`）。
//!
//! # 模块结构（How）
//! - [`builder`]：配置校验与冻结，产出不可变的 [`InstrumentConfig`]；
//! - `bound`：按 LabelSet 去重、带引用计数的绑定表与 [`BoundInstrument`] 句柄；
//! - `observer`：Observer 仪表的回调注册与 [`ObserverResult`]。
//!
//! # 契约说明（What）
//! - 仪表构建后 schema（名称、标签键、常量标签、absolute 标志）不可变，读取无需同步；
//! - 所有校验在转发给 Sink 之前完成，失败的记录不会产生任何副作用；
//! - 绑定表是本模块唯一的可变共享结构，`bind`/`unbind` 对引用计数线性一致。

pub mod builder;
mod bound;
mod observer;

use core::{fmt, marker::PhantomData};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    error::{MetricsError, Result},
    labels::LabelSet,
    meter::MeterState,
    number::{MetricNumber, MetricValue},
    sealed::Sealed,
    sink::InstrumentDescriptor,
};

pub use bound::BoundInstrument;
pub use builder::{InstrumentBuilder, InstrumentConfig};
pub use observer::ObserverResult;

use bound::BindingTable;
use observer::ObserverCallback;

/// 仪表语义标签。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Counter,
    Gauge,
    Measure,
    Observer,
}

impl InstrumentKind {
    /// 小写名称，用于日志字段。
    pub const fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::Measure => "measure",
            InstrumentKind::Observer => "observer",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 编译期仪表语义标记。
pub trait KindMarker: Send + Sync + 'static + Sealed {
    /// 对应的运行时语义标签。
    const KIND: InstrumentKind;
}

/// Counter 语义标记。
#[derive(Debug)]
pub enum CounterKind {}

/// Gauge 语义标记。
#[derive(Debug)]
pub enum GaugeKind {}

/// Measure 语义标记。
#[derive(Debug)]
pub enum MeasureKind {}

/// Observer 语义标记。
#[derive(Debug)]
pub enum ObserverKind {}

impl Sealed for CounterKind {}
impl Sealed for GaugeKind {}
impl Sealed for MeasureKind {}
impl Sealed for ObserverKind {}

impl KindMarker for CounterKind {
    const KIND: InstrumentKind = InstrumentKind::Counter;
}

impl KindMarker for GaugeKind {
    const KIND: InstrumentKind = InstrumentKind::Gauge;
}

impl KindMarker for MeasureKind {
    const KIND: InstrumentKind = InstrumentKind::Measure;
}

impl KindMarker for ObserverKind {
    const KIND: InstrumentKind = InstrumentKind::Observer;
}

pub type LongCounter = Instrument<i64, CounterKind>;
pub type DoubleCounter = Instrument<f64, CounterKind>;
pub type LongGauge = Instrument<i64, GaugeKind>;
pub type DoubleGauge = Instrument<f64, GaugeKind>;
pub type LongMeasure = Instrument<i64, MeasureKind>;
pub type DoubleMeasure = Instrument<f64, MeasureKind>;
pub type LongObserver = Instrument<i64, ObserverKind>;
pub type DoubleObserver = Instrument<f64, ObserverKind>;

pub type BoundLongCounter = BoundInstrument<i64, CounterKind>;
pub type BoundDoubleCounter = BoundInstrument<f64, CounterKind>;
pub type BoundLongGauge = BoundInstrument<i64, GaugeKind>;
pub type BoundDoubleGauge = BoundInstrument<f64, GaugeKind>;
pub type BoundLongMeasure = BoundInstrument<i64, MeasureKind>;
pub type BoundDoubleMeasure = BoundInstrument<f64, MeasureKind>;
pub type BoundLongObserver = BoundInstrument<i64, ObserverKind>;
pub type BoundDoubleObserver = BoundInstrument<f64, ObserverKind>;

/// 类型擦除后的仪表本体，由 Meter 注册表、绑定句柄与批量记录共享。
pub(crate) struct InstrumentCore {
    descriptor: InstrumentDescriptor,
    config: InstrumentConfig,
    meter: Arc<MeterState>,
    bindings: BindingTable,
    callback: RwLock<Option<Arc<dyn ObserverCallback>>>,
}

impl InstrumentCore {
    pub(crate) fn new(
        descriptor: InstrumentDescriptor,
        config: InstrumentConfig,
        meter: Arc<MeterState>,
    ) -> Self {
        Self {
            descriptor,
            config,
            meter,
            bindings: BindingTable::default(),
            callback: RwLock::new(None),
        }
    }

    pub(crate) fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    pub(crate) fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub(crate) fn meter(&self) -> &Arc<MeterState> {
        &self.meter
    }

    pub(crate) fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// 非负约束只对声明了 absolute 的 Measure 生效。
    fn requires_non_negative(&self) -> bool {
        matches!(self.config.kind(), InstrumentKind::Measure) && self.config.absolute()
    }

    pub(crate) fn check_value<N: MetricNumber>(&self, value: N) -> Result<()> {
        if self.requires_non_negative() && !value.is_non_negative() {
            return Err(MetricsError::NegativeValue {
                instrument: self.name().to_owned(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// 校验、合并常量标签并转发单个数据点。
    pub(crate) fn record_value<N: MetricNumber>(&self, value: N, labels: &LabelSet) -> Result<()> {
        self.check_value(value)?;
        let merged = labels.merged_with(self.config.constant_labels());
        self.emit(&merged, labels, value.into_value());
        Ok(())
    }

    /// `stripe_labels` 为调用方提供的标签，用于选择批量可见性分片。
    pub(crate) fn emit(&self, merged: &LabelSet, stripe_labels: &LabelSet, value: MetricValue) {
        self.meter
            .emit_point(&self.descriptor, merged, stripe_labels, value);
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn ObserverCallback>> {
        self.callback.read().clone()
    }

    pub(crate) fn replace_callback(&self, callback: Arc<dyn ObserverCallback>) {
        *self.callback.write() = Some(callback);
    }
}

impl fmt::Debug for InstrumentCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentCore")
            .field("descriptor", &self.descriptor)
            .field("live_bindings", &self.bindings.len())
            .finish()
    }
}

/// 仪表句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：面向埋点代码的主入口，既可逐次携带标签记录，也可预先绑定标签获得热路径句柄；
/// - **契约 (What)**：
///   - 克隆只复制引用，克隆体与原句柄是同一仪表（`==` 比较身份）；
///   - [`Instrument::record`] 在违约时返回错误且不向 Sink 转发任何值；
///   - [`Instrument::bind`] 与 [`Instrument::unbind`] 成对使用，引用计数归零时从绑定表移除；
/// - **风险 (Trade-offs)**：直接记录每次都会合并常量标签（可能分配）；高频路径应使用绑定句柄。
pub struct Instrument<N, K> {
    core: Arc<InstrumentCore>,
    _marker: PhantomData<fn() -> (N, K)>,
}

impl<N: MetricNumber, K: KindMarker> Instrument<N, K> {
    pub(crate) fn from_core(core: Arc<InstrumentCore>) -> Self {
        debug_assert_eq!(core.config().kind(), K::KIND);
        debug_assert_eq!(core.config().number_kind(), N::KIND);
        Self {
            core,
            _marker: PhantomData,
        }
    }

    pub(crate) fn core(&self) -> &Arc<InstrumentCore> {
        &self.core
    }

    /// 仪表名称。
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// 仪表语义。
    pub fn kind(&self) -> InstrumentKind {
        K::KIND
    }

    /// 交给聚合侧的仪表身份。
    pub fn descriptor(&self) -> &InstrumentDescriptor {
        self.core.descriptor()
    }

    /// 构建时冻结的配置。
    pub fn config(&self) -> &InstrumentConfig {
        self.core.config()
    }

    /// 以显式标签记录一次测量。
    ///
    /// # 契约说明
    /// - **输入参数**：`labels` 会与常量标签合并，键冲突时常量标签优先；
    /// - **错误**：absolute Measure 收到负值（或 NaN）时返回 [`MetricsError::NegativeValue`]，
    ///   此时 Sink 不会收到任何数据点。
    pub fn record(&self, value: N, labels: &LabelSet) -> Result<()> {
        self.core.record_value(value, labels)
    }

    /// 将标签组合绑定为可复用的句柄。
    ///
    /// # 契约说明
    /// - 若值相等的 LabelSet 已绑定，返回同一身份的句柄并将引用计数加一；
    /// - 否则创建新句柄，引用计数为 1；
    /// - 并发调用下不会出现同一标签组合的两个存活句柄。
    pub fn bind(&self, labels: &LabelSet) -> BoundInstrument<N, K> {
        let state = self
            .core
            .bindings
            .acquire(labels, self.core.config().constant_labels());
        BoundInstrument::new(Arc::clone(&self.core), state)
    }

    /// 释放一次绑定。
    ///
    /// # 契约说明
    /// - 引用计数减一，归零时从绑定表移除，句柄进入“已释放”状态；
    /// - **错误**：句柄属于其他仪表时返回 [`MetricsError::ForeignInstrument`]；
    ///   句柄已被完全释放（包括同一标签随后被重新绑定的旧句柄）时返回 [`MetricsError::UnknownBinding`]。
    pub fn unbind(&self, bound: &BoundInstrument<N, K>) -> Result<()> {
        if !Arc::ptr_eq(bound.core(), &self.core) {
            return Err(MetricsError::ForeignInstrument {
                instrument: bound.instrument_name().to_owned(),
                owner: self.name().to_owned(),
            });
        }

        let remaining = self.core.bindings.release(bound.state()).ok_or_else(|| {
            MetricsError::UnknownBinding {
                instrument: self.name().to_owned(),
                labels: bound.labels().to_string(),
            }
        })?;

        if remaining == 0 {
            tracing::debug!(
                meter = self.descriptor().meter(),
                instrument = self.name(),
                labels = %bound.labels(),
                "binding released"
            );
        }
        Ok(())
    }

    /// 当前绑定表中的存活条目数。
    pub fn bound_count(&self) -> usize {
        self.core.bindings.len()
    }

    /// 句柄在本仪表中的引用计数；句柄属于其他仪表或已释放时为 0。
    pub fn ref_count(&self, bound: &BoundInstrument<N, K>) -> usize {
        if Arc::ptr_eq(bound.core(), &self.core) {
            bound.ref_count()
        } else {
            0
        }
    }
}

impl<N, K> Clone for Instrument<N, K> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        }
    }
}

impl<N, K> PartialEq for Instrument<N, K> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<N, K> Eq for Instrument<N, K> {}

impl<N, K> fmt::Debug for Instrument<N, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instrument").field(&self.core).finish()
    }
}
