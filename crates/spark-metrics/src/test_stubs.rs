//! 测试桩：记录所有 Sink 回调的内存实现。
//!
//! 集成测试与下游 crate 的测试可以用 [`RecordingSink`] 断言数据点与批次括号的顺序。

use parking_lot::Mutex;

use crate::{
    labels::LabelSet,
    number::MetricValue,
    sink::{BatchId, InstrumentDescriptor, MetricsSink},
};

/// Sink 收到的一次回调。
///
/// `Record::batch` 为 `None` 表示单点记录，否则为所属批次。
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Record {
        instrument: String,
        labels: LabelSet,
        value: MetricValue,
        batch: Option<BatchId>,
    },
    BeginBatch(BatchId),
    EndBatch(BatchId),
}

/// 按到达顺序保存全部回调的 Sink。
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部事件的快照。
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// 只保留数据点，以 `(仪表名, 标签, 数值)` 形式返回。
    pub fn records(&self) -> Vec<(String, LabelSet, MetricValue)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Record {
                    instrument,
                    labels,
                    value,
                    ..
                } => Some((instrument.clone(), labels.clone(), *value)),
                _ => None,
            })
            .collect()
    }

    /// 批次 `batch` 的条目，按到达顺序返回 `(仪表名, 数值)`。
    pub fn batch_entries(&self, batch: BatchId) -> Vec<(String, MetricValue)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Record {
                    instrument,
                    value,
                    batch: Some(owner),
                    ..
                } if *owner == batch => Some((instrument.clone(), *value)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl MetricsSink for RecordingSink {
    fn on_record(&self, instrument: &InstrumentDescriptor, labels: &LabelSet, value: MetricValue) {
        self.events.lock().push(SinkEvent::Record {
            instrument: instrument.name().to_owned(),
            labels: labels.clone(),
            value,
            batch: None,
        });
    }

    fn on_batch_record(
        &self,
        batch: BatchId,
        instrument: &InstrumentDescriptor,
        labels: &LabelSet,
        value: MetricValue,
    ) {
        self.events.lock().push(SinkEvent::Record {
            instrument: instrument.name().to_owned(),
            labels: labels.clone(),
            value,
            batch: Some(batch),
        });
    }

    fn begin_batch(&self, batch: BatchId) {
        self.events.lock().push(SinkEvent::BeginBatch(batch));
    }

    fn end_batch(&self, batch: BatchId) {
        self.events.lock().push(SinkEvent::EndBatch(batch));
    }
}
