#![deny(unsafe_code)]
#![doc = "spark-metrics: 指标埋点契约核心。"]
#![doc = ""]
#![doc = "提供与顺序无关的 LabelSet、八类仪表（Counter/Gauge/Measure/Observer × i64/f64）、"]
#![doc = "带引用计数的绑定句柄、对外整体可见的批量记录，以及无锁的 Trace/Span ID 生成器。"]
#![doc = ""]
#![doc = "聚合与导出不在本 crate 范围内：数据点经由 [`MetricsSink`] 交给外部管线。"]
//!
//! # 快速上手
//!
//! ```
//! use std::sync::Arc;
//! use spark_metrics::{LabelSet, Meter, test_stubs::RecordingSink};
//!
//! let sink = Arc::new(RecordingSink::new());
//! let meter = Meter::builder("checkout").with_sink(sink.clone()).build();
//! let latency = meter
//!     .long_measure_builder("latency_ms")
//!     .set_absolute(true)
//!     .build()?;
//!
//! let labels = LabelSet::from_pairs(&["route", "/pay"])?;
//! latency.record(12, &labels)?;
//! assert!(latency.record(-1, &labels).is_err());
//!
//! let bound = latency.bind(&labels);
//! bound.record(7)?;
//! latency.unbind(&bound)?;
//! assert_eq!(sink.records().len(), 2);
//! # Ok::<(), spark_metrics::MetricsError>(())
//! ```

pub mod batch;
pub mod error;
pub mod ids;
pub mod instrument;
pub mod labels;
pub mod meter;
pub mod number;
pub mod registry;
mod sealed;
pub mod sink;
pub mod test_stubs;

pub use batch::BatchRecorder;
pub use error::{ErrorKind, MetricsError, Result};
pub use ids::{IdsGenerator, RandomIdsGenerator, SpanId, TraceId};
pub use instrument::{
    BoundDoubleCounter, BoundDoubleGauge, BoundDoubleMeasure, BoundDoubleObserver,
    BoundInstrument, BoundLongCounter, BoundLongGauge, BoundLongMeasure, BoundLongObserver,
    CounterKind, DoubleCounter, DoubleGauge, DoubleMeasure, DoubleObserver, GaugeKind, Instrument,
    InstrumentBuilder, InstrumentConfig, InstrumentKind, KindMarker, LongCounter, LongGauge,
    LongMeasure, LongObserver, MeasureKind, ObserverKind, ObserverResult,
};
pub use labels::LabelSet;
pub use meter::{Meter, MeterBuilder};
pub use number::{MetricNumber, MetricValue, NumberKind};
pub use registry::MeterRegistry;
pub use sink::{BatchId, InstrumentDescriptor, InstrumentId, MetricsSink, NoopSink};
