//! 把核心 [`IdsGenerator`] 适配为 OpenTelemetry SDK 的 `IdGenerator`。

use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::trace::IdGenerator;
use spark_metrics::IdsGenerator;

/// 以核心生成器产出 OpenTelemetry Trace/Span ID。
///
/// # 契约说明（What）
/// - 字节序为大端，高位字在前，与核心 `to_bytes` 一致；
/// - 核心生成器保证非全零，因此产出的 ID 总是 `is_valid()`。
#[derive(Clone, Debug, Default)]
pub struct OtelIdsGenerator<G> {
    inner: G,
}

impl<G: IdsGenerator> OtelIdsGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: IdsGenerator + 'static> IdGenerator for OtelIdsGenerator<G> {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from_bytes(self.inner.generate_trace_id().to_bytes())
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from_bytes(self.inner.generate_span_id().to_bytes())
    }
}
