//! 批量记录：一组共享标签的多仪表测量，整体对外可见。
//!
//! # 设计背景（Why）
//! - 同一事件往往同时更新多个仪表（例如请求数与请求耗时），聚合侧不应观察到“只更新了一半”的状态；
//! - 记录器是单个调用点的临时对象，因此以 `&mut self` 表达独占使用，无需内部同步。
//!
//! # 契约说明（What）
//! - `put` 立即校验数值与仪表归属，失败时记录器内容不变；
//! - 同一仪表重复 `put` 以最后一次为准，条目保持首次出现的位置；
//! - `record` 只能成功调用一次，之后的 `put`/`record` 返回 [`MetricsError::BatchSpent`]。

use core::fmt;
use std::sync::Arc;

use crate::{
    error::{MetricsError, Result},
    instrument::{Instrument, InstrumentCore, KindMarker},
    labels::LabelSet,
    meter::MeterState,
    number::{MetricNumber, MetricValue},
};

struct BatchEntry {
    core: Arc<InstrumentCore>,
    value: MetricValue,
}

/// 共享标签的批量记录器。
pub struct BatchRecorder {
    meter: Arc<MeterState>,
    labels: LabelSet,
    entries: Vec<BatchEntry>,
    spent: bool,
}

impl BatchRecorder {
    pub(crate) fn new(meter: Arc<MeterState>, labels: LabelSet) -> Self {
        Self {
            meter,
            labels,
            entries: Vec::new(),
            spent: false,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.spent {
            return Err(MetricsError::BatchSpent {
                labels: self.labels.to_string(),
            });
        }
        Ok(())
    }

    /// 加入一条测量，返回自身以便链式调用。
    ///
    /// # 错误
    /// - 记录器已提交：[`MetricsError::BatchSpent`]；
    /// - 仪表来自其他 Meter：[`MetricsError::ForeignInstrument`]；
    /// - absolute Measure 收到负值：[`MetricsError::NegativeValue`]。
    pub fn put<N: MetricNumber, K: KindMarker>(
        &mut self,
        instrument: &Instrument<N, K>,
        value: N,
    ) -> Result<&mut Self> {
        self.ensure_live()?;
        let core = instrument.core();
        if !Arc::ptr_eq(core.meter(), &self.meter) {
            return Err(MetricsError::ForeignInstrument {
                instrument: core.name().to_owned(),
                owner: self.meter.name().to_owned(),
            });
        }
        core.check_value(value)?;

        let value = value.into_value();
        match self
            .entries
            .iter_mut()
            .find(|entry| Arc::ptr_eq(&entry.core, core))
        {
            Some(entry) => entry.value = value,
            None => self.entries.push(BatchEntry {
                core: Arc::clone(core),
                value,
            }),
        }
        Ok(self)
    }

    /// 原子地提交整批测量。
    ///
    /// 常量标签合并在取得闸门前完成；Sink 在排他闸门下依次收到
    /// `begin_batch`、每个条目的 `on_batch_record` 与 `end_batch`。空批次同样产生一对括号。
    pub fn record(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.spent = true;

        let points: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                let merged = self
                    .labels
                    .merged_with(entry.core.config().constant_labels());
                (entry.core.descriptor(), merged, entry.value)
            })
            .collect();
        let batch = self.meter.emit_batch(&self.labels, &points);

        tracing::debug!(
            meter = self.meter.name(),
            labels = %self.labels,
            batch = batch.get(),
            entries = points.len(),
            "batch recorded"
        );
        Ok(())
    }

    /// 当前条目数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 整批共享的标签。
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// 是否已提交。
    pub fn is_spent(&self) -> bool {
        self.spent
    }
}

impl fmt::Debug for BatchRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRecorder")
            .field("meter", &self.meter.name())
            .field("labels", &self.labels)
            .field("entries", &self.entries.len())
            .field("spent", &self.spent)
            .finish()
    }
}
