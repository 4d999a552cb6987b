//! Meter：仪表工厂、注册表与批量可见性闸门。
//!
//! # 设计背景（Why）
//! - 一个 Meter 对应一个埋点组件；它负责创建仪表、构造 LabelSet 与批量记录器，
//!   并把所有数据点转发给同一个 [`MetricsSink`]；
//! - 批量记录需要相对于同标签的其他记录“不可分割”，因此 Meter 维护一组按 LabelSet 摘要分片的
//!   `RwLock<()>`：单点记录取读锁，批量记录取写锁；
//! - 闸门只覆盖同一分片，跨分片的归属由每个批次条目携带的 `BatchId` 表达，
//!   见 [`MetricsSink::on_batch_record`]。
//!
//! # 逻辑解析（How）
//! - [`Meter`] 是 `Arc<MeterInner>` 的廉价克隆外观；
//! - `MeterState` 持有名称、Sink 与分片闸门，被每个仪表共享；
//!   仪表注册表只由 `MeterInner` 持有，从而避免 Meter 与仪表之间的引用环；
//! - 注册表为 `DashMap<Arc<str>, Arc<InstrumentCore>>`，以 `entry()` 保证同名只登记一次。
//!
//! # 风险提示（Trade-offs）
//! - 闸门只包住 Sink 回调本身，Sink 内部不得再经由同一 Meter 记录，否则可能与等待中的批量写锁互等。

use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::RwLock;

use crate::{
    batch::BatchRecorder,
    error::{MetricsError, Result},
    instrument::{
        CounterKind, GaugeKind, InstrumentBuilder, InstrumentConfig, InstrumentCore, KindMarker,
        MeasureKind, ObserverKind,
    },
    labels::LabelSet,
    number::{MetricNumber, MetricValue},
    sink::{BatchId, InstrumentDescriptor, InstrumentId, MetricsSink, NoopSink},
};

/// 默认的批量闸门分片数。
pub const DEFAULT_BATCH_STRIPES: usize = 16;

/// 被 Meter 与其全部仪表共享的状态。
pub(crate) struct MeterState {
    name: Arc<str>,
    version: Option<Arc<str>>,
    sink: Arc<dyn MetricsSink>,
    stripes: Box<[RwLock<()>]>,
    next_instrument_id: AtomicU64,
    next_batch_id: AtomicU64,
}

impl MeterState {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn stripe(&self, labels: &LabelSet) -> &RwLock<()> {
        let mask = self.stripes.len() - 1;
        &self.stripes[(labels.digest() as usize) & mask]
    }

    /// 在共享闸门下转发单个数据点。
    pub(crate) fn emit_point(
        &self,
        descriptor: &InstrumentDescriptor,
        merged: &LabelSet,
        stripe_labels: &LabelSet,
        value: MetricValue,
    ) {
        let _gate = self.stripe(stripe_labels).read();
        self.sink.on_record(descriptor, merged, value);
    }

    /// 在排他闸门下转发整批数据点，返回批次编号。
    ///
    /// 编号在取得写锁之后分配，同一分片上的批次因此按编号顺序到达 Sink。
    pub(crate) fn emit_batch(
        &self,
        labels: &LabelSet,
        points: &[(&InstrumentDescriptor, LabelSet, MetricValue)],
    ) -> BatchId {
        let _gate = self.stripe(labels).write();
        let batch = BatchId(self.next_batch_id.fetch_add(1, Ordering::Relaxed));
        self.sink.begin_batch(batch);
        for (descriptor, merged, value) in points {
            self.sink.on_batch_record(batch, descriptor, merged, *value);
        }
        self.sink.end_batch(batch);
        batch
    }
}

struct MeterInner {
    state: Arc<MeterState>,
    instruments: DashMap<Arc<str>, Arc<InstrumentCore>>,
}

/// 埋点组件的入口。
///
/// # 教案式说明
/// - **意图 (Why)**：为一个组件集中管理仪表命名空间与聚合出口；
/// - **契约 (What)**：
///   - 克隆共享同一命名空间与 Sink；
///   - 八个 `*_builder` 工厂返回对应语义与数值类型的 [`InstrumentBuilder`]；
///   - 同名仪表只登记一次，详见 [`InstrumentBuilder::build`]；
/// - **风险 (Trade-offs)**：仪表在 Meter 存活期间不会被注销，命名空间只增不减。
#[derive(Clone)]
pub struct Meter {
    inner: Arc<MeterInner>,
}

impl Meter {
    /// 以 [`NoopSink`] 创建 Meter。
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// 返回可配置版本、Sink 与闸门分片数的构建器。
    pub fn builder(name: impl Into<String>) -> MeterBuilder {
        MeterBuilder::new(name.into())
    }

    /// Meter 名称（通常为组件名）。
    pub fn name(&self) -> &str {
        self.inner.state.name()
    }

    /// 组件版本（若声明）。
    pub fn version(&self) -> Option<&str> {
        self.inner.state.version.as_deref()
    }

    /// 已登记的仪表数量。
    pub fn instrument_count(&self) -> usize {
        self.inner.instruments.len()
    }

    /// 批量闸门分片数。
    pub fn batch_stripes(&self) -> usize {
        self.inner.state.stripes.len()
    }

    fn instrument_builder<N: MetricNumber, K: KindMarker>(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<N, K> {
        InstrumentBuilder::new(self.clone(), name.into())
    }

    /// 单调累加的 `i64` 计数器。
    pub fn long_counter_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<i64, CounterKind> {
        self.instrument_builder(name)
    }

    /// 单调累加的 `f64` 计数器。
    pub fn double_counter_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<f64, CounterKind> {
        self.instrument_builder(name)
    }

    /// 记录当前值的 `i64` 仪表盘。
    pub fn long_gauge_builder(&self, name: impl Into<String>) -> InstrumentBuilder<i64, GaugeKind> {
        self.instrument_builder(name)
    }

    /// 记录当前值的 `f64` 仪表盘。
    pub fn double_gauge_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<f64, GaugeKind> {
        self.instrument_builder(name)
    }

    /// 记录离散测量的 `i64` 仪表，可用 `set_absolute` 拒绝负值。
    pub fn long_measure_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<i64, MeasureKind> {
        self.instrument_builder(name)
    }

    /// 记录离散测量的 `f64` 仪表，可用 `set_absolute` 拒绝负值。
    pub fn double_measure_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<f64, MeasureKind> {
        self.instrument_builder(name)
    }

    /// 由采集回调上报 `i64` 值的观察器。
    pub fn long_observer_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<i64, ObserverKind> {
        self.instrument_builder(name)
    }

    /// 由采集回调上报 `f64` 值的观察器。
    pub fn double_observer_builder(
        &self,
        name: impl Into<String>,
    ) -> InstrumentBuilder<f64, ObserverKind> {
        self.instrument_builder(name)
    }

    /// 见 [`LabelSet::from_pairs`]。
    pub fn create_label_set<S: AsRef<str>>(&self, pairs: &[S]) -> Result<LabelSet> {
        LabelSet::from_pairs(pairs)
    }

    /// 见 [`LabelSet::from_map`]。
    pub fn create_label_set_from_map<I, K, V>(&self, labels: Option<I>) -> Result<LabelSet>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        LabelSet::from_map(labels)
    }

    /// 为一组共享标签创建批量记录器。
    pub fn new_batch_recorder(&self, labels: &LabelSet) -> BatchRecorder {
        BatchRecorder::new(Arc::clone(&self.inner.state), labels.clone())
    }

    /// 调用所有已注册的 Observer 回调一次，返回实际执行的回调数。
    ///
    /// 回调列表先被快照，执行期间不持有注册表锁。
    pub fn run_observers(&self) -> usize {
        let observers: Vec<_> = self
            .inner
            .instruments
            .iter()
            .filter_map(|entry| {
                let core = entry.value();
                core.callback().map(|callback| (Arc::clone(core), callback))
            })
            .collect();

        for (core, callback) in &observers {
            callback.run(core);
        }
        tracing::trace!(meter = self.name(), observers = observers.len(), "observers collected");
        observers.len()
    }

    /// 登记仪表；同名同配置返回已有本体，配置不一致返回冲突错误。
    pub(crate) fn register(&self, config: InstrumentConfig) -> Result<Arc<InstrumentCore>> {
        match self.inner.instruments.entry(Arc::clone(config.shared_name())) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if existing.config() == &config {
                    return Ok(Arc::clone(existing));
                }
                tracing::warn!(
                    meter = self.name(),
                    instrument = config.name(),
                    existing_kind = %existing.config().kind(),
                    requested_kind = %config.kind(),
                    "conflicting instrument registration"
                );
                Err(MetricsError::ConflictingRegistration {
                    name: config.name().to_owned(),
                })
            }
            Entry::Vacant(entry) => {
                let state = &self.inner.state;
                let id = InstrumentId(state.next_instrument_id.fetch_add(1, Ordering::Relaxed));
                let descriptor = InstrumentDescriptor::new(
                    Arc::clone(&state.name),
                    id,
                    Arc::clone(config.shared_name()),
                    config.kind(),
                    config.number_kind(),
                    config.unit().map(Arc::from),
                );
                tracing::debug!(
                    meter = self.name(),
                    instrument = config.name(),
                    kind = %config.kind(),
                    id = id.get(),
                    "instrument registered"
                );
                let core = Arc::new(InstrumentCore::new(descriptor, config, Arc::clone(state)));
                entry.insert(Arc::clone(&core));
                Ok(core)
            }
        }
    }
}

impl PartialEq for Meter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Meter {}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("instruments", &self.instrument_count())
            .field("batch_stripes", &self.batch_stripes())
            .finish()
    }
}

/// [`Meter`] 的构建器。
#[must_use = "构建器需要调用 build() 才会产出 Meter"]
pub struct MeterBuilder {
    name: String,
    version: Option<String>,
    sink: Arc<dyn MetricsSink>,
    batch_stripes: usize,
}

impl MeterBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            version: None,
            sink: Arc::new(NoopSink),
            batch_stripes: DEFAULT_BATCH_STRIPES,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 设置批量闸门分片数；向上取整到 2 的幂，最小为 1。
    pub fn with_batch_stripes(mut self, stripes: usize) -> Self {
        self.batch_stripes = stripes;
        self
    }

    pub fn build(self) -> Meter {
        let stripes = self.batch_stripes.max(1).next_power_of_two();
        let state = MeterState {
            name: Arc::from(self.name),
            version: self.version.map(Arc::from),
            sink: self.sink,
            stripes: (0..stripes).map(|_| RwLock::new(())).collect(),
            next_instrument_id: AtomicU64::new(0),
            next_batch_id: AtomicU64::new(0),
        };
        tracing::debug!(meter = %state.name, stripes, "meter created");
        Meter {
            inner: Arc::new(MeterInner {
                state: Arc::new(state),
                instruments: DashMap::new(),
            }),
        }
    }
}

impl fmt::Debug for MeterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterBuilder")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("batch_stripes", &self.batch_stripes)
            .finish_non_exhaustive()
    }
}
