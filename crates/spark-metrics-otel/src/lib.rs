//! spark-metrics 的日志与追踪集成层。
//!
//! # 教案式说明
//! - **意图（Why）**：埋点核心只依赖 `tracing` 门面输出日志；宿主进程需要一处“一键式”入口，
//!   把 `tracing` 事件接到终端输出与 OpenTelemetry 追踪上，并让 Span/Trace ID 由核心的
//!   [`spark_metrics::IdsGenerator`] 生成；
//! - **逻辑（How）**：[`install`] 组装 `EnvFilter + fmt + tracing-opentelemetry` 三层 Subscriber，
//!   [`OtelIdsGenerator`] 负责 ID 适配，[`TracingSink`] 把数据点转成 `tracing` 事件；
//! - **契约（What）**：`install` 每个进程只能成功一次；日志级别由 `RUST_LOG` 控制，缺省为 `info`。

mod ids;
mod sink;

pub use ids::OtelIdsGenerator;
pub use sink::TracingSink;

use std::{borrow::Cow, sync::OnceLock};

use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    Resource,
    trace::{self, TracerProvider},
};
use spark_metrics::RandomIdsGenerator;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

#[cfg(feature = "test-util")]
use opentelemetry_sdk::export::trace::SpanData;
#[cfg(feature = "test-util")]
use test_support::InMemorySpanExporter;

/// 安装状态的全局缓存，确保 `install` 仅执行一次。
static INSTALL_STATE: OnceLock<InstallState> = OnceLock::new();

/// 安装过程可能出现的错误。
///
/// # 教案式说明
/// - **意图（Why）**：归纳安装阶段的全部失败路径，便于启动流程与集成测试统一处理；
/// - **契约（What）**：所有错误都实现 [`std::error::Error`]。
#[derive(Debug)]
pub enum Error {
    /// `install` 被重复调用。
    AlreadyInstalled,
    /// 外部提前设置了全局 `tracing` Subscriber，无法再次注册。
    SubscriberAlreadySet,
    /// 设置全局 Subscriber 失败的底层错误。
    SetGlobalSubscriber(tracing::dispatcher::SetGlobalDefaultError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::AlreadyInstalled => {
                f.write_str("spark-metrics-otel 已完成安装，禁止重复调用 install")
            }
            Error::SubscriberAlreadySet => {
                f.write_str("全局 tracing Subscriber 已存在，spark-metrics-otel 无法覆盖")
            }
            Error::SetGlobalSubscriber(err) => {
                write!(f, "设置 tracing 全局 Subscriber 失败: {err}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// 安装后的持久状态，保持 `TracerProvider` 在进程生命周期内有效。
struct InstallState {
    // 只作为生命周期护栏；`testing::force_flush` 在 test-util 下读取它。
    #[cfg_attr(not(feature = "test-util"), allow(dead_code))]
    provider: TracerProvider,
}

/// 零配置安装入口。
///
/// # 教案式说明
/// - **逻辑（How）**：
///   1. 检查重复安装与外部已设置的 Subscriber；
///   2. 构建以 [`OtelIdsGenerator`] 生成 ID 的 `TracerProvider`，并注册到 `opentelemetry::global`；
///   3. 组装 `EnvFilter + fmt + OpenTelemetry` 三层 Subscriber 并设为全局默认；
///   4. 将 Provider 写入 `INSTALL_STATE`。
/// - **契约（What）**：重复调用返回 [`Error::AlreadyInstalled`]；调用前外部已配置 Subscriber 时返回
///   [`Error::SubscriberAlreadySet`]。
pub fn install() -> Result<(), Error> {
    if INSTALL_STATE.get().is_some() {
        return Err(Error::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(Error::SubscriberAlreadySet);
    }

    let state = install_impl()?;
    INSTALL_STATE
        .set(state)
        .map_err(|_| Error::AlreadyInstalled)
}

fn install_impl() -> Result<InstallState, Error> {
    let tracer_provider = build_tracer_provider();
    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.versioned_tracer(
        "spark.metrics",
        Some(env!("CARGO_PKG_VERSION")),
        Some(Cow::Borrowed(env!("CARGO_PKG_NAME"))),
        None,
    );

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer));
    tracing::subscriber::set_global_default(subscriber).map_err(Error::SetGlobalSubscriber)?;

    tracing::debug!(
        package = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "observability installed"
    );
    Ok(InstallState {
        provider: tracer_provider,
    })
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_tracer_provider() -> TracerProvider {
    #[allow(unused_mut)]
    let mut builder = TracerProvider::builder().with_config(
        trace::config()
            .with_sampler(trace::Sampler::AlwaysOn)
            .with_id_generator(OtelIdsGenerator::new(RandomIdsGenerator))
            .with_resource(Resource::default()),
    );

    #[cfg(feature = "test-util")]
    {
        let exporter = fetch_in_memory_exporter();
        builder = builder.with_simple_exporter(exporter.clone());
    }

    builder.build()
}

#[cfg(feature = "test-util")]
fn fetch_in_memory_exporter() -> InMemorySpanExporter {
    static EXPORTER: OnceLock<InMemorySpanExporter> = OnceLock::new();
    EXPORTER.get_or_init(InMemorySpanExporter::default).clone()
}

#[cfg(feature = "test-util")]
mod test_support {
    use std::sync::{Arc, Mutex};

    use futures_util::future::BoxFuture;
    use opentelemetry::trace::{TraceError, TraceResult};
    use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};

    /// 收集已完成 Span 供断言的内存导出器。
    ///
    /// # 教案式说明
    /// - **意图（Why）**：`opentelemetry-sdk/testing` 会间接启用 `async-std`，这里只保留“收集 Span”这一能力；
    /// - **契约（What）**：`export` 追加整批 Span 后立即就绪；`reset` 清空缓冲；锁被毒化时以 `TraceError` 报告。
    #[derive(Clone, Debug, Default)]
    pub struct InMemorySpanExporter {
        spans: Arc<Mutex<Vec<SpanData>>>,
    }

    impl InMemorySpanExporter {
        pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanData>> {
            self.spans
                .lock()
                .map(|guard| guard.clone())
                .map_err(TraceError::from)
        }

        pub fn reset(&self) {
            if let Ok(mut guard) = self.spans.lock() {
                guard.clear();
            }
        }
    }

    impl SpanExporter for InMemorySpanExporter {
        fn export(&mut self, mut batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            let result = self
                .spans
                .lock()
                .map(|mut guard| guard.append(&mut batch))
                .map_err(TraceError::from);

            Box::pin(async move { result })
        }

        fn shutdown(&mut self) {
            self.reset();
        }
    }
}

#[cfg(feature = "test-util")]
/// 测试辅助工具：访问安装后导出的 Span。
pub mod testing {
    use super::*;

    /// 强制刷新 Provider，确保已结束的 Span 进入导出器。
    pub fn force_flush() {
        if let Some(state) = INSTALL_STATE.get() {
            for result in state.provider.force_flush() {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "span flush failed");
                }
            }
        }
    }

    /// 自安装（或上次 [`reset`]）以来导出的全部 Span。
    pub fn finished_spans() -> Vec<SpanData> {
        fetch_in_memory_exporter()
            .get_finished_spans()
            .unwrap_or_default()
    }

    /// 清空内存导出器，隔离测试案例。
    pub fn reset() {
        fetch_in_memory_exporter().reset();
    }
}
