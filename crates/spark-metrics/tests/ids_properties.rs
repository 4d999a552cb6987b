//! ID 生成器的有效性与重试语义。
//!
//! - **核心目标 (Why)**：全零 ID 在传播链路上表示“无效上下文”，生成器一旦产出将导致 Span 被静默丢弃；
//! - **设计手法 (How)**：大样本检验默认生成器；以预置序列的随机源验证重试循环确实跳过了全零结果。

use std::{collections::VecDeque, thread};

use proptest::prelude::*;
use rand::RngCore;
use spark_metrics::{
    IdsGenerator, RandomIdsGenerator, SpanId, TraceId,
    ids::{span_id_from_rng, trace_id_from_rng},
};

/// 按预置序列吐出 `u64` 的随机源，序列耗尽时 panic。
struct ScriptedRng {
    words: VecDeque<u64>,
    draws: usize,
}

impl ScriptedRng {
    fn new(words: &[u64]) -> Self {
        Self {
            words: words.iter().copied().collect(),
            draws: 0,
        }
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.words.pop_front().expect("预置序列已耗尽")
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let word = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[test]
fn million_span_ids_are_valid() {
    let generator = RandomIdsGenerator;
    for _ in 0..1_000_000 {
        assert_ne!(generator.generate_span_id(), SpanId::INVALID);
    }
}

#[test]
fn million_trace_ids_are_valid() {
    let generator = RandomIdsGenerator;
    for _ in 0..1_000_000 {
        let id = generator.generate_trace_id();
        assert!(id.high() != 0 || id.low() != 0);
    }
}

#[test]
fn span_retry_skips_zero_draws() {
    let mut rng = ScriptedRng::new(&[0, 0, 42]);
    assert_eq!(span_id_from_rng(&mut rng), SpanId::from_u64(42));
    assert_eq!(rng.draws, 3);
}

#[test]
fn trace_retry_redraws_only_when_both_words_are_zero() {
    let mut rng = ScriptedRng::new(&[0, 0, 0, 9]);
    assert_eq!(trace_id_from_rng(&mut rng), TraceId::from_parts(0, 9));
    assert_eq!(rng.draws, 4);

    let mut rng = ScriptedRng::new(&[5, 0]);
    assert_eq!(trace_id_from_rng(&mut rng), TraceId::from_parts(5, 0));
    assert_eq!(rng.draws, 2);
}

#[test]
fn generator_is_usable_from_many_threads() {
    let generator = RandomIdsGenerator;
    let workers: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(move || {
                (0..10_000).all(|_| {
                    generator.generate_span_id().is_valid()
                        && generator.generate_trace_id().is_valid()
                })
            })
        })
        .collect();
    for worker in workers {
        assert!(worker.join().expect("工作线程不应 panic"));
    }
}

#[test]
fn generators_are_usable_as_trait_objects() {
    let generator: Box<dyn IdsGenerator> = Box::new(RandomIdsGenerator);
    assert!(generator.generate_span_id().is_valid());
    assert_eq!(generator.generate_trace_id().to_string().len(), 32);
}

proptest! {
    #[test]
    fn prop_scripted_span_ids_skip_leading_zeros(zeros in 0usize..16, value in 1u64..) {
        let mut script = vec![0; zeros];
        script.push(value);
        let mut rng = ScriptedRng::new(&script);
        prop_assert_eq!(span_id_from_rng(&mut rng).to_u64(), value);
        prop_assert_eq!(rng.draws, zeros + 1);
    }
}
