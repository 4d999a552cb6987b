//! 仪表数值类型：`long`（`i64`）与 `double`（`f64`）两种变体。

use core::fmt;

use crate::sealed::Sealed;

/// 仪表接受的数值类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumberKind {
    Long,
    Double,
}

/// 一次记录中携带的数值，交给聚合侧消费。
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Long(i64),
    Double(f64),
}

impl MetricValue {
    /// 数值所属类型。
    pub fn kind(&self) -> NumberKind {
        match self {
            MetricValue::Long(_) => NumberKind::Long,
            MetricValue::Double(_) => NumberKind::Double,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Long(value) => write!(f, "{value}"),
            MetricValue::Double(value) => write!(f, "{value}"),
        }
    }
}

/// 仪表数值的密封 Trait，只为 `i64` 与 `f64` 实现。
///
/// # 契约说明（What）
/// - `is_non_negative` 决定 absolute 仪表是否接受该值：`f64::NAN` 不被视为非负，`-0.0` 被视为非负；
/// - `into_value` 为零成本转换。
pub trait MetricNumber: Copy + Send + Sync + fmt::Debug + fmt::Display + 'static + Sealed {
    /// 对应的数值类型标签。
    const KIND: NumberKind;

    /// 转换为类型擦除后的 [`MetricValue`]。
    fn into_value(self) -> MetricValue;

    /// 是否满足 absolute 仪表的非负约束。
    fn is_non_negative(self) -> bool;
}

impl Sealed for i64 {}

impl MetricNumber for i64 {
    const KIND: NumberKind = NumberKind::Long;

    fn into_value(self) -> MetricValue {
        MetricValue::Long(self)
    }

    fn is_non_negative(self) -> bool {
        self >= 0
    }
}

impl Sealed for f64 {}

impl MetricNumber for f64 {
    const KIND: NumberKind = NumberKind::Double;

    fn into_value(self) -> MetricValue {
        MetricValue::Double(self)
    }

    fn is_non_negative(self) -> bool {
        self >= 0.0
    }
}
