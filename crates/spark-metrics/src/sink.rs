//! 聚合管线的接入契约。
//!
//! # 设计背景（Why）
//! - 埋点 API 只负责“记录”，不决定聚合与导出方式；外部聚合管线通过实现 [`MetricsSink`] 接收数据点。
//! - 批量记录需要对外呈现为不可分割的整体，因此契约中显式提供 begin/end 括号，
//!   聚合侧可以缓冲到 end 标记后再对自己的读者公开结果。
//!
//! # 契约说明（What）
//! - 单点记录恰好调用一次 [`MetricsSink::on_record`]，标签已与仪表的常量标签合并；
//! - 批量记录的每个条目调用 [`MetricsSink::on_batch_record`] 并携带所属 `BatchId`，
//!   整批被同一 `BatchId` 的 `begin_batch`/`end_batch` 包围；
//! - 传给 Sink 的值都已通过校验，Sink 不会看到被拒绝的记录。
//!
//! # 风险提示（Trade-offs）
//! - 括号只对同一标签分片上的记录排他：其他分片的单点记录与批次可能出现在某个批次的
//!   begin/end 之间，聚合侧必须按条目携带的 `BatchId` 归属数据点，而不是按到达位置；
//! - 回调在记录线程上同步执行，Sink 实现必须足够快且不可阻塞；
//!   同一标签分片上的批量记录会在回调期间持有排他锁。

use std::sync::Arc;

use crate::{
    instrument::InstrumentKind,
    labels::LabelSet,
    number::{MetricValue, NumberKind},
};

/// 仪表在所属 Meter 内的唯一编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId(pub(crate) u64);

impl InstrumentId {
    /// 原始编号。
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// 批量记录的编号。
///
/// - 在同一 Meter 内唯一，按批次取得闸门的先后顺序递增分配；
/// - 共享同一标签分片的批次以编号升序到达 Sink；不同分片之间的到达顺序不作保证。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub(crate) u64);

impl BatchId {
    /// 原始编号。
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// 交给聚合侧的仪表身份。
///
/// # 契约说明（What）
/// - `meter` 与 `id` 共同唯一标识一个仪表；`name` 在同一 Meter 内同样唯一；
/// - 描述符在仪表构建时冻结，之后只读。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentDescriptor {
    meter: Arc<str>,
    id: InstrumentId,
    name: Arc<str>,
    kind: InstrumentKind,
    number_kind: NumberKind,
    unit: Option<Arc<str>>,
}

impl InstrumentDescriptor {
    pub(crate) fn new(
        meter: Arc<str>,
        id: InstrumentId,
        name: Arc<str>,
        kind: InstrumentKind,
        number_kind: NumberKind,
        unit: Option<Arc<str>>,
    ) -> Self {
        Self {
            meter,
            id,
            name,
            kind,
            number_kind,
            unit,
        }
    }

    /// 所属 Meter 的名称。
    pub fn meter(&self) -> &str {
        &self.meter
    }

    /// 仪表编号。
    pub fn id(&self) -> InstrumentId {
        self.id
    }

    /// 仪表名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 仪表语义。
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// 数值类型。
    pub fn number_kind(&self) -> NumberKind {
        self.number_kind
    }

    /// 单位（若声明）。
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }
}

/// 聚合管线需实现的接收端。
pub trait MetricsSink: Send + Sync + 'static {
    /// 接收一个不属于任何批次的已校验数据点。
    fn on_record(&self, instrument: &InstrumentDescriptor, labels: &LabelSet, value: MetricValue);

    /// 接收批次 `batch` 的一个条目。
    ///
    /// 缺省实现转交 [`MetricsSink::on_record`]，适合不区分批次的 Sink；
    /// 需要整批公开的 Sink 应覆写本方法，按 `batch` 缓冲到对应的 `end_batch`。
    fn on_batch_record(
        &self,
        batch: BatchId,
        instrument: &InstrumentDescriptor,
        labels: &LabelSet,
        value: MetricValue,
    ) {
        let _ = batch;
        self.on_record(instrument, labels, value);
    }

    /// 批量记录开始；编号为 `batch` 的条目随后经由 [`MetricsSink::on_batch_record`] 到达。
    fn begin_batch(&self, batch: BatchId) {
        let _ = batch;
    }

    /// 批量记录结束，该批次的全部条目均已送达，聚合侧可在此时对外公开整批结果。
    fn end_batch(&self, batch: BatchId) {
        let _ = batch;
    }
}

/// 丢弃全部数据点的 Sink，作为未配置聚合管线时的默认值。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn on_record(&self, _: &InstrumentDescriptor, _: &LabelSet, _: MetricValue) {}
}
