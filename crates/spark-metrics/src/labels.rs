//! 标签集合（LabelSet）建模。
//!
//! # 设计背景（Why）
//! - 仪表以“名称 + 标签维度”作为键；同一组键值无论以何种顺序构造，都必须被视为同一维度组合，
//!   否则绑定表会出现重复条目、聚合侧会出现分裂的时间序列。
//! - 标签集合会在热路径上被克隆、比较与哈希，因此采用 `Arc` 共享的有序映射，并在构造时预先计算摘要。
//!
//! # 契约说明（What）
//! - 相等性只取决于最终的键值映射；哈希与相等性保持一致；
//! - 空集合是合法且唯一的值，代表“无标签”；
//! - 构造完成后不可变，外部源映射的后续修改不会影响已构造的集合。

use std::{
    collections::{BTreeMap, hash_map::DefaultHasher},
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
};

use crate::error::{MetricsError, Result};

/// 不可变、与顺序无关的标签键值集合。
///
/// # 逻辑解析（How）
/// - 内部以 `BTreeMap<Arc<str>, Arc<str>>` 存储，天然按键排序，从而消除插入顺序的影响；
/// - `digest` 为规范形式的 64 bit 摘要，在构造时计算一次，`Hash` 直接复用它；
/// - 克隆只增加引用计数。
///
/// # 风险提示（Trade-offs）
/// - 摘要使用固定种子的 SipHash，只用于进程内分片与哈希表，不具备抗碰撞的安全属性；
///   相等性判断始终回落到完整的映射比较。
#[derive(Clone)]
pub struct LabelSet {
    inner: Arc<LabelSetInner>,
}

struct LabelSetInner {
    entries: BTreeMap<Arc<str>, Arc<str>>,
    digest: u64,
}

impl LabelSet {
    /// 规范的空集合。
    pub fn empty() -> Self {
        static EMPTY: OnceLock<LabelSet> = OnceLock::new();
        EMPTY
            .get_or_init(|| LabelSet::from_entries(BTreeMap::new()))
            .clone()
    }

    /// 从扁平的 `key, value, key, value, ...` 序列构造。
    ///
    /// # 契约说明
    /// - **输入参数**：`pairs` 长度必须为偶数；长度为 0 时返回 [`LabelSet::empty`]；
    /// - **错误**：奇数长度返回 [`MetricsError::OddLabelSequence`]；
    /// - **后置条件**：同一个键出现多次时保留最后一次出现的值。
    pub fn from_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        if pairs.len() % 2 != 0 {
            return Err(MetricsError::OddLabelSequence { len: pairs.len() });
        }
        if pairs.is_empty() {
            return Ok(Self::empty());
        }

        let entries = pairs
            .chunks_exact(2)
            .map(|pair| (Arc::from(pair[0].as_ref()), Arc::from(pair[1].as_ref())))
            .collect();
        Ok(Self::from_entries(entries))
    }

    /// 从键值映射构造。
    ///
    /// # 契约说明
    /// - **输入参数**：`labels` 为任意可迭代的键值对来源（`&HashMap`、`&BTreeMap`、`Vec<(K, V)>` 等）；
    ///   `None` 表示调用方没有提供映射；
    /// - **错误**：`None` 返回 [`MetricsError::NullArgument`]；
    /// - **后置条件**：条目被逐一复制，源映射之后的修改不会反映到结果中。
    pub fn from_map<I, K, V>(labels: Option<I>) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let labels = labels.ok_or(MetricsError::NullArgument { argument: "labels" })?;
        Ok(labels.into_iter().collect())
    }

    fn from_entries(entries: BTreeMap<Arc<str>, Arc<str>>) -> Self {
        let mut hasher = DefaultHasher::new();
        for (key, value) in &entries {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        let digest = hasher.finish();
        Self {
            inner: Arc::new(LabelSetInner { entries, digest }),
        }
    }

    /// 以常量标签补全当前集合，发生键冲突时常量标签优先。
    ///
    /// - 任一侧为空时直接返回另一侧的克隆，不产生新的分配；
    /// - 该规则在直接记录、绑定句柄与批量记录三条路径上保持一致。
    pub fn merged_with(&self, constant: &LabelSet) -> LabelSet {
        if constant.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return constant.clone();
        }

        let mut entries = self.inner.entries.clone();
        for (key, value) in &constant.inner.entries {
            entries.insert(Arc::clone(key), Arc::clone(value));
        }
        Self::from_entries(entries)
    }

    /// 按键查询标签值。
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.entries.get(key).map(|value| value.as_ref())
    }

    /// 按键的字典序迭代全部标签。
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &str)> {
        self.inner
            .entries
            .iter()
            .map(|(key, value)| (key.as_ref(), value.as_ref()))
    }

    /// 标签条目数量。
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// 是否为空集合。
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// 规范形式的摘要，供分片选择使用。
    pub(crate) fn digest(&self) -> u64 {
        self.inner.digest
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries: BTreeMap<Arc<str>, Arc<str>> = iter
            .into_iter()
            .map(|(key, value)| (Arc::from(key.as_ref()), Arc::from(value.as_ref())))
            .collect();
        if entries.is_empty() {
            return Self::empty();
        }
        Self::from_entries(entries)
    }
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.digest == other.inner.digest
                && self.inner.entries == other.inner.entries)
    }
}

impl Eq for LabelSet {}

impl Hash for LabelSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.inner.digest);
    }
}

impl fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (key, value)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}
