// End-to-end scenarios: decoded packets in, sink calls out.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use mockall::*;

use crate::aggregator::FlowAggregator;
use crate::flow::AggregationMode;
use crate::ingest::Ingestor;
use crate::flow::FlowKey;
use crate::metrics::MetricsSink;
use crate::models::domain::{DecodedPacket, Ipv4Layer, TcpLayer};
use crate::publish::{PublishReport, Publisher};
use crate::ExporterError;

mock! {
    pub Sink {}
    impl MetricsSink for Sink {
        fn add(&self, key: &str, value: f64) -> crate::Result<()>;
        fn remove(&self, key: &str) -> crate::Result<()>;
    }
}

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

fn segment(src: Ipv4Addr, sport: u16, dst: Ipv4Addr, dport: u16, len: u16, fin_ack: bool) -> DecodedPacket {
    DecodedPacket::tcp_v4(
        Ipv4Layer {
            source: src,
            destination: dst,
            total_len: len,
        },
        TcpLayer {
            source_port: sport,
            destination_port: dport,
            fin: fin_ack,
            ack: true,
        },
    )
}

/// A: client -> server, 100 bytes. B: server -> client, 200 bytes, FIN+ACK.
fn conversation() -> [DecodedPacket; 2] {
    [
        segment(CLIENT, 5000, SERVER, 443, 100, false),
        segment(SERVER, 443, CLIENT, 5000, 200, true),
    ]
}

#[test]
fn grouped_conversation_is_published_once_then_evicted() {
    let aggregator = Arc::new(FlowAggregator::new());
    let ingestor = Ingestor::new(aggregator.clone(), AggregationMode::Grouped);
    let [a, b] = conversation();

    let key_a = ingestor.ingest(&a).unwrap();
    assert_eq!(aggregator.snapshot()[0].bytes, 100);
    let key_b = ingestor.ingest(&b).unwrap();
    assert_eq!(key_a, key_b);
    assert_eq!(key_a.as_str(), "10.0.0.1-10.0.0.2-443");
    assert_eq!(aggregator.snapshot()[0].bytes, 200);
    assert_eq!(aggregator.pending_completions(), 1);

    let mut sink = MockSink::new();
    let mut seq = Sequence::new();
    sink.expect_add()
        .with(predicate::eq("10.0.0.1-10.0.0.2-443"), predicate::eq(200.0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    sink.expect_remove()
        .with(predicate::eq("10.0.0.1-10.0.0.2-443"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let publisher = Publisher::new(aggregator.clone(), Arc::new(sink), false);
    let report = publisher.publish_cycle();

    assert_eq!(report, PublishReport { emitted: 1, evicted: 1 });
    assert!(aggregator.is_empty());
}

#[test]
fn directional_conversation_keeps_two_flows_and_evicts_one() {
    let aggregator = Arc::new(FlowAggregator::new());
    let ingestor = Ingestor::new(aggregator.clone(), AggregationMode::Directional);
    for packet in conversation() {
        ingestor.ingest(&packet);
    }

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].key, "10.0.0.1-5000-10.0.0.2-443");
    assert_eq!(snapshot[0].bytes, 100);
    assert_eq!(snapshot[1].key, "10.0.0.2-443-10.0.0.1-5000");
    assert_eq!(snapshot[1].bytes, 200);

    let mut sink = MockSink::new();
    sink.expect_add().times(2).returning(|_, _| Ok(()));
    sink.expect_remove()
        .with(predicate::eq("10.0.0.2-443-10.0.0.1-5000"))
        .times(1)
        .returning(|_| Ok(()));

    Publisher::new(aggregator.clone(), Arc::new(sink), false).publish_cycle();

    let remaining = aggregator.snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].key, "10.0.0.1-5000-10.0.0.2-443");
    assert_eq!(remaining[0].bytes, 100);
}

#[test]
fn quiet_cycle_touches_nothing() {
    let aggregator = Arc::new(FlowAggregator::new());
    let mut sink = MockSink::new();
    sink.expect_add().never();
    sink.expect_remove().never();

    let report = Publisher::new(aggregator, Arc::new(sink), true).publish_cycle();
    assert_eq!(report, PublishReport::default());
}

#[test]
fn sink_failures_do_not_stop_the_cycle() {
    let aggregator = Arc::new(FlowAggregator::new());
    let ingestor = Ingestor::new(aggregator.clone(), AggregationMode::Grouped);
    for packet in conversation() {
        ingestor.ingest(&packet);
    }
    ingestor.ingest(&segment(CLIENT, 6000, SERVER, 22, 64, false));

    let mut sink = MockSink::new();
    sink.expect_add()
        .times(2)
        .returning(|_, _| Err(ExporterError::Server("sink down".to_string())));
    sink.expect_remove()
        .times(1)
        .returning(|_| Err(ExporterError::Server("sink down".to_string())));

    let report = Publisher::new(aggregator.clone(), Arc::new(sink), false).publish_cycle();

    assert_eq!(report, PublishReport { emitted: 0, evicted: 1 });
    assert_eq!(aggregator.len(), 1);
}

#[test]
fn packets_after_snapshot_survive_until_next_cycle() {
    let aggregator = Arc::new(FlowAggregator::new());
    let ingestor = Ingestor::new(aggregator.clone(), AggregationMode::Grouped);
    let mut sink = MockSink::new();
    sink.expect_add().returning(|_, _| Ok(()));
    sink.expect_remove().returning(|_| Ok(()));
    let publisher = Publisher::new(aggregator.clone(), Arc::new(sink), false);

    ingestor.ingest(&segment(CLIENT, 5000, SERVER, 443, 100, false));
    publisher.publish_cycle();
    assert_eq!(aggregator.len(), 1);

    ingestor.ingest(&segment(CLIENT, 5000, SERVER, 443, 40, true));
    assert_eq!(aggregator.snapshot()[0].bytes, 40);
    publisher.publish_cycle();
    assert!(aggregator.is_empty());
}

/// Sink that ingests a packet from inside `add`, the way the capture side can
/// while a cycle is emitting.
struct IngestingSink {
    ingestor: Ingestor,
    pending: Mutex<Option<DecodedPacket>>,
    added: Mutex<Vec<(String, f64)>>,
    removed: Mutex<Vec<String>>,
}

impl MetricsSink for IngestingSink {
    fn add(&self, key: &str, value: f64) -> crate::Result<()> {
        self.added.lock().unwrap().push((key.to_string(), value));
        if let Some(packet) = self.pending.lock().unwrap().take() {
            self.ingestor.ingest(&packet);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> crate::Result<()> {
        let added = self.added.lock().unwrap();
        assert!(
            added.iter().any(|(k, _)| k == key),
            "series {} removed before any value was emitted",
            key
        );
        self.removed.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[test]
fn fin_ack_arriving_mid_cycle_is_published_before_eviction() {
    let aggregator = Arc::new(FlowAggregator::new());
    let ingestor = Ingestor::new(aggregator.clone(), AggregationMode::Grouped);
    ingestor.ingest(&segment(CLIENT, 5000, SERVER, 443, 100, false));

    let late = segment(CLIENT, 7000, SERVER, 8443, 90, true);
    let late_key = FlowKey::derive(CLIENT, 7000, SERVER, 8443, AggregationMode::Grouped);
    let sink = Arc::new(IngestingSink {
        ingestor: ingestor.clone(),
        pending: Mutex::new(Some(late)),
        added: Mutex::new(Vec::new()),
        removed: Mutex::new(Vec::new()),
    });
    let publisher = Publisher::new(aggregator.clone(), sink.clone(), false);

    let first = publisher.publish_cycle();
    assert_eq!(first, PublishReport { emitted: 1, evicted: 0 });
    assert_eq!(aggregator.len(), 2);
    assert_eq!(aggregator.pending_completions(), 1);

    let second = publisher.publish_cycle();
    assert_eq!(second, PublishReport { emitted: 2, evicted: 1 });
    assert!(sink
        .added
        .lock()
        .unwrap()
        .contains(&(late_key.to_string(), 90.0)));
    assert_eq!(*sink.removed.lock().unwrap(), vec![late_key.to_string()]);
    assert_eq!(aggregator.len(), 1);
}

#[test]
fn record_during_emission_of_completed_flow_is_kept() {
    let aggregator = Arc::new(FlowAggregator::new());
    let ingestor = Ingestor::new(aggregator.clone(), AggregationMode::Grouped);
    ingestor.ingest(&segment(CLIENT, 5000, SERVER, 443, 200, true));

    // Same conversation, new packet, lands while the finished flow is being emitted.
    let sink = Arc::new(IngestingSink {
        ingestor: ingestor.clone(),
        pending: Mutex::new(Some(segment(CLIENT, 5000, SERVER, 443, 60, false))),
        added: Mutex::new(Vec::new()),
        removed: Mutex::new(Vec::new()),
    });
    let report = Publisher::new(aggregator.clone(), sink, false).publish_cycle();

    assert_eq!(report, PublishReport { emitted: 1, evicted: 1 });
    let remaining = aggregator.snapshot();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].bytes, 60);
}
