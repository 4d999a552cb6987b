//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义指标埋点 API 对外暴露的全部错误语义，所有校验失败都在违约调用处同步返回；
//! - 错误只分三大类（[`ErrorKind`]），调用方可按类别断言，也可按细粒度变体定位具体违约点。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，消息中必须携带出错的仪表名、标签或数值；
//! - 本模块不存在可重试错误：ID 生成在内部重试，不会以错误形式暴露。

use thiserror::Error;

/// 指标 API 的统一返回类型。
pub type Result<T, E = MetricsError> = core::result::Result<T, E>;

/// 错误大类。
///
/// - `InvalidArgument`：参数内容违约（非法名称、奇数标签序列、负值、注册冲突、未知句柄）；
/// - `NullArgument`：必需的引用缺失（以 `Option::None` 表达）；
/// - `IllegalState`：在已失效的对象上继续操作。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NullArgument,
    IllegalState,
}

/// 指标埋点错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：埋点错误几乎都是编程期误用，需要在 setup 阶段“尽早、响亮”地失败，
///   而不是在聚合阶段悄悄丢弃数据；
/// - **契约 (What)**：
///   - 所有变体均 `Send + Sync + 'static`，可安全跨线程传播；
///   - [`MetricsError::kind`] 将每个变体映射到唯一的 [`ErrorKind`]；
/// - **设计权衡 (Trade-offs)**：上下文以 `String` 保存，牺牲少量分配换取可读的诊断信息；
///   错误路径不在热路径上，这一成本可以接受。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    /// 仪表名称违反命名规则（非空、可打印 ASCII、长度不超过 255）。
    #[error("invalid instrument name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// 扁平键值序列长度为奇数。
    #[error("label key/value sequence must have an even length, got {len} elements")]
    OddLabelSequence { len: usize },

    /// 向 absolute 仪表记录了负值（或 NaN）。
    #[error("instrument `{instrument}` only accepts non-negative values, got {value}")]
    NegativeValue { instrument: String, value: String },

    /// 同名仪表已以不同配置注册。
    #[error("instrument `{name}` is already registered with a different configuration")]
    ConflictingRegistration { name: String },

    /// 解绑的句柄不在当前仪表的绑定表中（已完全释放或被重新绑定）。
    #[error("instrument `{instrument}` has no live binding for labels {labels}")]
    UnknownBinding { instrument: String, labels: String },

    /// 句柄或仪表不属于当前的仪表/Meter。
    #[error("instrument `{instrument}` does not belong to `{owner}`")]
    ForeignInstrument { instrument: String, owner: String },

    /// 必需参数缺失。
    #[error("required argument `{argument}` is absent")]
    NullArgument { argument: &'static str },

    /// BatchRecorder 已经提交过，不可复用。
    #[error("batch recorder for labels {labels} has already been recorded")]
    BatchSpent { labels: String },

    /// 绑定句柄已被完全释放，后续记录不再被接受。
    #[error("binding of instrument `{instrument}` for labels {labels} has been released")]
    BindingReleased { instrument: String, labels: String },
}

impl MetricsError {
    /// 返回错误所属大类。
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::InvalidName { .. }
            | MetricsError::OddLabelSequence { .. }
            | MetricsError::NegativeValue { .. }
            | MetricsError::ConflictingRegistration { .. }
            | MetricsError::UnknownBinding { .. }
            | MetricsError::ForeignInstrument { .. } => ErrorKind::InvalidArgument,
            MetricsError::NullArgument { .. } => ErrorKind::NullArgument,
            MetricsError::BatchSpent { .. } | MetricsError::BindingReleased { .. } => {
                ErrorKind::IllegalState
            }
        }
    }

    /// 是否属于 [`ErrorKind::InvalidArgument`]。
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// 是否属于 [`ErrorKind::IllegalState`]。
    pub fn is_illegal_state(&self) -> bool {
        self.kind() == ErrorKind::IllegalState
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_kind() {
        let invalid = [
            MetricsError::InvalidName {
                name: String::new(),
                reason: "empty",
            },
            MetricsError::OddLabelSequence { len: 3 },
            MetricsError::NegativeValue {
                instrument: "m".into(),
                value: "-1".into(),
            },
            MetricsError::ConflictingRegistration { name: "m".into() },
            MetricsError::UnknownBinding {
                instrument: "m".into(),
                labels: "{}".into(),
            },
            MetricsError::ForeignInstrument {
                instrument: "m".into(),
                owner: "meter".into(),
            },
        ];
        for err in invalid {
            assert!(err.is_invalid_argument(), "{err} 应归类为 InvalidArgument");
        }

        assert_eq!(
            MetricsError::NullArgument { argument: "labels" }.kind(),
            ErrorKind::NullArgument
        );
        assert!(MetricsError::BatchSpent { labels: "{}".into() }.is_illegal_state());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = MetricsError::NegativeValue {
            instrument: "queue_depth".into(),
            value: "-9".into(),
        };
        let text = err.to_string();
        assert!(text.contains("queue_depth"));
        assert!(text.contains("-9"));
    }
}
