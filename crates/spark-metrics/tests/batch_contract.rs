//! BatchRecorder 的原子可见性与一次性语义。
//!
//! - **核心目标 (Why)**：聚合侧依赖 begin/end 括号与条目携带的 `BatchId` 判断一批数据何时完整；
//! - **设计手法 (How)**：单线程场景断言事件序列；多线程场景分别让批量记录与直接记录竞争同一标签
//!   以及不同标签，逐个事件回放，断言每个数据点都能归属到正确的批次或不属于任何批次。

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Barrier},
    thread,
};

use spark_metrics::{
    BatchId, LabelSet, Meter, MetricValue, MetricsError, MetricsSink,
    test_stubs::{RecordingSink, SinkEvent},
};

/// 按到达顺序回放事件，校验批次归属，返回 `(每批标签, 单点记录数)`。
///
/// - 批次条目只能出现在本批次的 begin/end 之间；
/// - 同一批次的条目共享同一组标签，且数量等于 `entries_per_batch`；
/// - 单点记录（`batch == None`）可以出现在任意位置。
fn replay(events: &[SinkEvent], entries_per_batch: usize) -> (HashMap<BatchId, LabelSet>, usize) {
    let mut open: HashMap<BatchId, (usize, Option<LabelSet>)> = HashMap::new();
    let mut closed = HashMap::new();
    let mut seen = HashSet::new();
    let mut singles = 0;
    for event in events {
        match event {
            SinkEvent::BeginBatch(id) => {
                assert!(seen.insert(*id), "批次编号 {id:?} 重复出现");
                open.insert(*id, (0, None));
            }
            SinkEvent::Record {
                labels,
                batch: Some(id),
                ..
            } => {
                let (count, batch_labels) = open
                    .get_mut(id)
                    .unwrap_or_else(|| panic!("批次 {id:?} 的条目落在其括号之外"));
                *count += 1;
                let expected = batch_labels.get_or_insert_with(|| labels.clone());
                assert_eq!(&*expected, labels, "同一批次的标签必须一致");
            }
            SinkEvent::Record { batch: None, .. } => singles += 1,
            SinkEvent::EndBatch(id) => {
                let (count, labels) = open
                    .remove(id)
                    .unwrap_or_else(|| panic!("批次 {id:?} 的 end 没有对应的 begin"));
                assert_eq!(count, entries_per_batch, "批次 {id:?} 的条目数不完整");
                closed.insert(*id, labels.unwrap_or_default());
            }
        }
    }
    assert!(open.is_empty(), "仍有未关闭的批次: {open:?}");
    (closed, singles)
}

fn recording_meter(name: &str) -> (Meter, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let meter = Meter::builder(name).with_sink(sink.clone()).build();
    (meter, sink)
}

#[test]
fn batch_is_bracketed_and_single_use() {
    let (meter, sink) = recording_meter("batch");
    let requests = meter.long_counter_builder("requests").build().unwrap();
    let latency = meter.double_measure_builder("latency").build().unwrap();
    let labels = LabelSet::from_pairs(&["route", "/checkout"]).unwrap();

    let mut batch = meter.new_batch_recorder(&labels);
    batch.put(&requests, 1).unwrap().put(&latency, 12.5).unwrap();
    batch.record().unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 4);
    let SinkEvent::BeginBatch(begin) = events[0] else {
        panic!("批次应以 begin 开始: {events:?}");
    };
    assert_eq!(events[3], SinkEvent::EndBatch(begin));
    assert_eq!(
        events[1],
        SinkEvent::Record {
            instrument: "requests".into(),
            labels: labels.clone(),
            value: MetricValue::Long(1),
            batch: Some(begin),
        }
    );
    assert_eq!(
        events[2],
        SinkEvent::Record {
            instrument: "latency".into(),
            labels: labels.clone(),
            value: MetricValue::Double(12.5),
            batch: Some(begin),
        }
    );

    let again = batch.record().unwrap_err();
    assert!(again.is_illegal_state());
    assert!(matches!(
        batch.put(&requests, 2).map(|_| ()),
        Err(MetricsError::BatchSpent { .. })
    ));
    assert_eq!(sink.len(), 4);
    assert_eq!(
        sink.batch_entries(begin),
        vec![
            ("requests".to_owned(), MetricValue::Long(1)),
            ("latency".to_owned(), MetricValue::Double(12.5)),
        ]
    );
}

#[test]
fn empty_batch_still_emits_brackets() {
    let (meter, sink) = recording_meter("empty-batch");
    let mut batch = meter.new_batch_recorder(&LabelSet::empty());
    assert!(batch.is_empty());
    batch.record().unwrap();
    assert!(matches!(
        sink.events().as_slice(),
        [SinkEvent::BeginBatch(a), SinkEvent::EndBatch(b)] if a == b
    ));
}

#[test]
fn batch_ids_increase_per_meter() {
    let (meter, sink) = recording_meter("batch-ids");
    for _ in 0..3 {
        meter.new_batch_recorder(&LabelSet::empty()).record().unwrap();
    }
    let ids: Vec<u64> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SinkEvent::BeginBatch(id) => Some(id.get()),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn concurrent_records_never_interleave_with_a_batch() {
    let (meter, sink) = recording_meter("batch-race");
    let counter = meter.long_counter_builder("ops").build().unwrap();
    let gauge = meter.long_gauge_builder("depth").build().unwrap();
    let labels = LabelSet::from_pairs(&["shard", "7"]).unwrap();

    let batches = {
        let meter = meter.clone();
        let counter = counter.clone();
        let gauge = gauge.clone();
        let labels = labels.clone();
        thread::spawn(move || {
            for round in 0..200 {
                let mut batch = meter.new_batch_recorder(&labels);
                batch.put(&counter, 1).unwrap().put(&gauge, round).unwrap();
                batch.record().unwrap();
            }
        })
    };
    let directs: Vec<_> = (0..4)
        .map(|_| {
            let counter = counter.clone();
            let labels = labels.clone();
            thread::spawn(move || {
                let bound = counter.bind(&labels);
                for _ in 0..200 {
                    counter.record(1, &labels).unwrap();
                    bound.record(1).unwrap();
                }
            })
        })
        .collect();

    batches.join().expect("批量线程不应 panic");
    for handle in directs {
        handle.join().expect("记录线程不应 panic");
    }

    let events = sink.events();
    let mut open = None;
    for event in &events {
        match event {
            SinkEvent::BeginBatch(id) => {
                assert!(open.is_none(), "同一分片上的批次不应嵌套");
                open = Some(*id);
            }
            SinkEvent::EndBatch(id) => assert_eq!(open.take(), Some(*id)),
            SinkEvent::Record { batch, .. } => {
                assert_eq!(*batch, open, "同标签的单点记录不得落入批次括号");
            }
        }
    }
    let (batches, singles) = replay(&events, 2);
    assert_eq!(batches.len(), 200);
    assert!(batches.values().all(|batch_labels| *batch_labels == labels));
    assert_eq!(singles, 4 * 200 * 2);
}

#[test]
fn points_on_other_labels_are_attributed_by_batch_id() {
    let (meter, sink) = recording_meter("batch-cross-stripe");
    let counter = meter.long_counter_builder("ops").build().unwrap();
    let gauge = meter.long_gauge_builder("depth").build().unwrap();
    let batch_labels = [
        LabelSet::from_pairs(&["shard", "7"]).unwrap(),
        LabelSet::from_pairs(&["region", "us"]).unwrap(),
    ];

    let batchers: Vec<_> = batch_labels
        .iter()
        .cloned()
        .map(|labels| {
            let meter = meter.clone();
            let counter = counter.clone();
            let gauge = gauge.clone();
            thread::spawn(move || {
                for round in 0..200 {
                    let mut batch = meter.new_batch_recorder(&labels);
                    batch.put(&counter, 1).unwrap().put(&gauge, round).unwrap();
                    batch.record().unwrap();
                }
            })
        })
        .collect();
    let directs: Vec<_> = (0..4)
        .map(|worker| {
            let counter = counter.clone();
            let labels = LabelSet::from_pairs(&["worker".to_owned(), worker.to_string()]).unwrap();
            thread::spawn(move || {
                let bound = counter.bind(&labels);
                for _ in 0..200 {
                    counter.record(1, &labels).unwrap();
                    bound.record(1).unwrap();
                }
            })
        })
        .collect();

    for handle in batchers.into_iter().chain(directs) {
        handle.join().expect("记录线程不应 panic");
    }

    let (batches, singles) = replay(&sink.events(), 2);
    assert_eq!(batches.len(), 400);
    for labels in &batch_labels {
        assert_eq!(batches.values().filter(|owner| *owner == labels).count(), 200);
    }
    assert_eq!(singles, 4 * 200 * 2);
    for id in batches.keys() {
        assert_eq!(sink.batch_entries(*id).len(), 2);
    }
}

#[test]
fn batches_sharing_labels_reach_the_sink_in_id_order() {
    let (meter, sink) = recording_meter("batch-order");
    let counter = meter.long_counter_builder("ops").build().unwrap();
    let labels = LabelSet::from_pairs(&["shard", "1"]).unwrap();
    let start = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let meter = meter.clone();
            let counter = counter.clone();
            let labels = labels.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..100 {
                    let mut batch = meter.new_batch_recorder(&labels);
                    batch.put(&counter, 1).unwrap();
                    batch.record().unwrap();
                }
            })
        })
        .collect();
    for handle in workers {
        handle.join().expect("批量线程不应 panic");
    }

    let begins: Vec<u64> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SinkEvent::BeginBatch(id) => Some(id.get()),
            _ => None,
        })
        .collect();
    assert_eq!(begins, (0..800).collect::<Vec<_>>());
}

#[test]
fn sink_trait_objects_receive_batches() {
    let sink: Arc<dyn MetricsSink> = Arc::new(RecordingSink::new());
    let meter = Meter::builder("dyn-sink").with_sink(Arc::clone(&sink)).build();
    let counter = meter.long_counter_builder("c").build().unwrap();
    let mut batch = meter.new_batch_recorder(&LabelSet::empty());
    batch.put(&counter, 1).unwrap();
    batch.record().unwrap();
    assert!(batch.is_spent());
    assert_eq!(batch.len(), 1);
}
