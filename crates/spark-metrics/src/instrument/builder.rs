//! 仪表构建器与冻结后的配置。
//!
//! # 设计背景（Why）
//! - 配置在构建前可以逐项设置，构建后必须整体冻结；Rust 中以“消费型 builder”表达：
//!   `build(self)` 取得所有权，构建器无法在构建后被再次修改或复用。
//! - `set_absolute` 只对 Measure 有意义，因此只在 `InstrumentBuilder<N, MeasureKind>` 上提供，
//!   误用会在编译期被拒绝。
//!
//! # 契约说明（What）
//! - 名称规则：非空、仅包含可打印 ASCII（`0x20..=0x7E`）、长度不超过 [`MAX_NAME_LEN`]；
//! - 同一 Meter 内，同名且配置完全一致的构建返回同一个仪表；配置不一致时返回
//!   [`MetricsError::ConflictingRegistration`]。

use core::{fmt, marker::PhantomData};
use std::sync::Arc;

use crate::{
    error::{MetricsError, Result},
    instrument::{Instrument, InstrumentKind, KindMarker, MeasureKind},
    labels::LabelSet,
    meter::Meter,
    number::{MetricNumber, NumberKind},
};

/// 仪表名称允许的最大长度。
pub const MAX_NAME_LEN: usize = 255;

/// 校验仪表名称。
///
/// 检查顺序依次为：非空、字符集、长度。
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if !name.bytes().all(|byte| (0x20..=0x7e).contains(&byte)) {
        Some("name must contain only printable ASCII characters")
    } else if name.len() > MAX_NAME_LEN {
        Some("name must not exceed 255 characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(MetricsError::InvalidName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// 构建时冻结的仪表配置。
///
/// 两个配置相等当且仅当名称、语义、数值类型、描述、单位、标签键、常量标签与 absolute 标志全部一致；
/// Meter 以此判断重复注册是否兼容。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentConfig {
    name: Arc<str>,
    kind: InstrumentKind,
    number_kind: NumberKind,
    description: Option<String>,
    unit: Option<String>,
    label_keys: Vec<String>,
    constant_labels: LabelSet,
    absolute: bool,
}

impl InstrumentConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub fn number_kind(&self) -> NumberKind {
        self.number_kind
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// 声明的推荐标签键，仅作为元数据，不约束记录时的标签。
    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    /// 附加到每个数据点的常量标签。
    pub fn constant_labels(&self) -> &LabelSet {
        &self.constant_labels
    }

    /// 是否只接受非负值；非 Measure 仪表恒为 `false`。
    pub fn absolute(&self) -> bool {
        self.absolute
    }
}

/// 仪表构建器。
///
/// # 教案式说明
/// - **意图 (Why)**：把“声明仪表”与“使用仪表”分离，声明阶段集中完成全部校验；
/// - **契约 (What)**：
///   - 各 `set_*` 方法可按任意顺序调用，重复调用以最后一次为准；
///   - [`InstrumentBuilder::build`] 校验名称并在 Meter 中登记；
///   - 未设置 absolute 时默认为 `false`；
/// - **风险 (Trade-offs)**：构建器持有 Meter 的克隆，长期保留未构建的构建器会延长 Meter 的生命周期。
#[must_use = "构建器需要调用 build() 才会产出仪表"]
pub struct InstrumentBuilder<N, K> {
    meter: Meter,
    name: String,
    description: Option<String>,
    unit: Option<String>,
    label_keys: Vec<String>,
    constant_labels: LabelSet,
    absolute: bool,
    _marker: PhantomData<fn() -> (N, K)>,
}

impl<N: MetricNumber, K: KindMarker> InstrumentBuilder<N, K> {
    pub(crate) fn new(meter: Meter, name: String) -> Self {
        Self {
            meter,
            name,
            description: None,
            unit: None,
            label_keys: Vec::new(),
            constant_labels: LabelSet::empty(),
            absolute: false,
            _marker: PhantomData,
        }
    }

    /// 设置人类可读的描述。
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 设置单位，例如 `"ms"`、`"By"`。
    pub fn set_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// 设置推荐标签键。
    pub fn set_label_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// 设置常量标签；与调用方标签冲突时常量标签优先。
    pub fn set_constant_labels<I, LK, LV>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (LK, LV)>,
        LK: AsRef<str>,
        LV: AsRef<str>,
    {
        self.constant_labels = labels.into_iter().collect();
        self
    }

    /// 校验配置并在 Meter 中登记。
    ///
    /// # 错误
    /// - 名称违规：[`MetricsError::InvalidName`]；
    /// - 同名仪表已以不同配置存在：[`MetricsError::ConflictingRegistration`]。
    pub fn build(self) -> Result<Instrument<N, K>> {
        validate_name(&self.name)?;
        let config = InstrumentConfig {
            name: Arc::from(self.name),
            kind: K::KIND,
            number_kind: N::KIND,
            description: self.description,
            unit: self.unit,
            label_keys: self.label_keys,
            constant_labels: self.constant_labels,
            absolute: self.absolute,
        };
        let core = self.meter.register(config)?;
        Ok(Instrument::from_core(core))
    }
}

impl<N: MetricNumber> InstrumentBuilder<N, MeasureKind> {
    /// 声明 Measure 只接受非负值。
    pub fn set_absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }
}

impl<N, K> fmt::Debug for InstrumentBuilder<N, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("label_keys", &self.label_keys)
            .field("constant_labels", &self.constant_labels)
            .field("absolute", &self.absolute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules_are_checked_in_order() {
        assert!(validate_name("a").is_ok());
        assert!(validate_name(" ~").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());

        let reason = |name: &str| match validate_name(name) {
            Err(MetricsError::InvalidName { reason, .. }) => reason,
            other => panic!("期望 InvalidName，得到 {other:?}"),
        };
        assert_eq!(reason(""), "name must not be empty");
        assert_eq!(reason("tab\there"), "name must contain only printable ASCII characters");
        assert_eq!(reason("延迟"), "name must contain only printable ASCII characters");
        assert_eq!(
            reason(&"x".repeat(MAX_NAME_LEN + 1)),
            "name must not exceed 255 characters"
        );
    }

    #[test]
    fn absolute_defaults_to_false() {
        let meter = Meter::new("builder-test");
        let measure = meter.long_measure_builder("latency").build().unwrap();
        assert!(!measure.config().absolute());
        assert_eq!(measure.config().kind(), InstrumentKind::Measure);
        assert_eq!(measure.config().number_kind(), NumberKind::Long);
    }

    #[test]
    fn setters_are_last_write_wins() {
        let meter = Meter::new("builder-test");
        let counter = meter
            .double_counter_builder("bytes")
            .set_unit("B")
            .set_unit("By")
            .set_description("bytes sent")
            .set_label_keys(["peer"])
            .set_constant_labels([("zone", "z1")])
            .build()
            .unwrap();
        let config = counter.config();
        assert_eq!(config.unit(), Some("By"));
        assert_eq!(config.description(), Some("bytes sent"));
        assert_eq!(config.label_keys().to_vec(), vec!["peer".to_owned()]);
        assert_eq!(config.constant_labels().get("zone"), Some("z1"));
        assert_eq!(counter.descriptor().unit(), Some("By"));
    }
}
