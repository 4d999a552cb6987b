//! 把数据点转写为 `tracing` 事件的 Sink。
//!
//! 适用于本地调试与没有聚合管线的进程：安装 [`crate::install`] 后，数据点随日志一起输出，
//! 并在存在活动 Span 时被 `tracing-opentelemetry` 关联为 Span 事件。

use spark_metrics::{BatchId, InstrumentDescriptor, LabelSet, MetricValue, MetricsSink};
use tracing::Level;

/// `tracing` 宏要求静态级别，这里按运行时配置分派到对应的宏。
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::error!($($arg)+);
        } else if level == Level::WARN {
            tracing::warn!($($arg)+);
        } else if level == Level::INFO {
            tracing::info!($($arg)+);
        } else if level == Level::DEBUG {
            tracing::debug!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    }};
}

/// 以 `tracing` 事件输出数据点的 [`MetricsSink`]。
///
/// # 契约说明（What）
/// - 每个数据点产生一个事件，字段为 `meter`、`instrument`、`kind`、`labels`、`value`；
/// - 批次条目额外携带 `batch` 字段，批次括号以同一级别输出同一 `batch` 值，
///   日志读者据此把条目归属到批次，不依赖事件的先后位置；
/// - 缺省级别为 `DEBUG`。
#[derive(Clone, Copy, Debug)]
pub struct TracingSink {
    level: Level,
}

impl TracingSink {
    pub fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    pub fn with_level(level: Level) -> Self {
        Self { level }
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for TracingSink {
    fn on_record(&self, instrument: &InstrumentDescriptor, labels: &LabelSet, value: MetricValue) {
        event_at!(
            self.level,
            meter = instrument.meter(),
            instrument = instrument.name(),
            kind = %instrument.kind(),
            labels = %labels,
            value = %value,
            "metric recorded"
        );
    }

    fn on_batch_record(
        &self,
        batch: BatchId,
        instrument: &InstrumentDescriptor,
        labels: &LabelSet,
        value: MetricValue,
    ) {
        event_at!(
            self.level,
            batch = batch.get(),
            meter = instrument.meter(),
            instrument = instrument.name(),
            kind = %instrument.kind(),
            labels = %labels,
            value = %value,
            "metric recorded"
        );
    }

    fn begin_batch(&self, batch: BatchId) {
        event_at!(self.level, batch = batch.get(), "metric batch begin");
    }

    fn end_batch(&self, batch: BatchId) {
        event_at!(self.level, batch = batch.get(), "metric batch end");
    }
}
