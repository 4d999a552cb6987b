//! 内部 sealed 模块用于控制外部扩展边界。
//!
//! # 设计背景（Why）
//! - 数值类型（`i64`/`f64`）与仪表语义标记（Counter/Gauge/Measure/Observer）是封闭集合，
//!   聚合侧依赖这一封闭性做穷尽匹配；
//! - `Sealed` 位于私有模块中，外部 crate 无法命名，因此无法为自有类型实现 [`crate::MetricNumber`]
//!   或 [`crate::KindMarker`]。
//!
//! # 维护提示（Maintenance）
//! - 新增数值类型或仪表语义时，需要同步补齐 `NumberKind`/`InstrumentKind` 的枚举分支。
pub trait Sealed {}
