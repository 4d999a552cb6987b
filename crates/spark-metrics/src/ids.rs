//! Trace/Span 标识符与随机生成器。
//!
//! # 设计背景（Why）
//! - 全零标识在追踪上下文中表示“无效”，生成器绝不能产出它；
//! - 生成发生在每个 Span 的创建路径上，必须无锁：随机源取自每线程惰性播种的 `rand::thread_rng()`。
//!
//! # 逻辑解析（How）
//! - [`span_id_from_rng`] 与 [`trace_id_from_rng`] 是真正的重试循环，接受任意 `RngCore`，
//!   调用方可以显式传入自己的随机源；
//! - [`RandomIdsGenerator`] 只是把线程本地随机源交给这两个函数。

use core::fmt;

use rand::RngCore;

/// 64 bit Span 标识，0 为无效值。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    pub const INVALID: SpanId = SpanId(0);

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// 大端字节序表示。
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 128 bit Trace 标识，由高低两个 64 bit 字组成；两字同时为 0 时无效。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId {
    high: u64,
    low: u64,
}

impl TraceId {
    pub const INVALID: TraceId = TraceId { high: 0, low: 0 };

    pub const fn from_parts(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub const fn high(self) -> u64 {
        self.high
    }

    pub const fn low(self) -> u64 {
        self.low
    }

    pub const fn is_valid(self) -> bool {
        self.high != 0 || self.low != 0
    }

    /// 大端字节序表示，高位字在前。
    pub fn to_bytes(self) -> [u8; 16] {
        let mut bytes = [0_u8; 16];
        bytes[..8].copy_from_slice(&self.high.to_be_bytes());
        bytes[8..].copy_from_slice(&self.low.to_be_bytes());
        bytes
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

/// 标识符生成器。
///
/// # 契约说明（What）
/// - `generate_span_id` 永不返回 [`SpanId::INVALID`]；
/// - `generate_trace_id` 永不返回 [`TraceId::INVALID`]，但单个字可以为 0；
/// - 实现必须可被多线程同时调用。
pub trait IdsGenerator: Send + Sync + fmt::Debug {
    fn generate_span_id(&self) -> SpanId;

    fn generate_trace_id(&self) -> TraceId;
}

/// 从给定随机源生成有效 SpanId，遇到 0 时重新抽取。
pub fn span_id_from_rng<R: RngCore + ?Sized>(rng: &mut R) -> SpanId {
    loop {
        let id = SpanId(rng.next_u64());
        if id.is_valid() {
            return id;
        }
    }
}

/// 从给定随机源生成有效 TraceId，两字同时为 0 时重新抽取两字。
pub fn trace_id_from_rng<R: RngCore + ?Sized>(rng: &mut R) -> TraceId {
    loop {
        let id = TraceId {
            high: rng.next_u64(),
            low: rng.next_u64(),
        };
        if id.is_valid() {
            return id;
        }
    }
}

/// 基于线程本地随机源的生成器。
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdsGenerator;

impl IdsGenerator for RandomIdsGenerator {
    fn generate_span_id(&self) -> SpanId {
        span_id_from_rng(&mut rand::thread_rng())
    }

    fn generate_trace_id(&self) -> TraceId {
        trace_id_from_rng(&mut rand::thread_rng())
    }
}
