use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::{debug, trace};

use crate::aggregator::FlowAggregator;
use crate::flow::{AggregationMode, FlowKey};
use crate::models::domain::DecodedPacket;

/// Feeds decoded packets into the flow table.
#[derive(Clone)]
pub struct Ingestor {
    aggregator: Arc<FlowAggregator>,
    mode: AggregationMode,
}

impl Ingestor {
    pub fn new(aggregator: Arc<FlowAggregator>, mode: AggregationMode) -> Self {
        Self { aggregator, mode }
    }

    /// Records one packet. Packets without both an IPv4 and a TCP layer are
    /// skipped and yield `None`.
    pub fn ingest(&self, packet: &DecodedPacket) -> Option<FlowKey> {
        let (Some(ip), Some(tcp)) = (packet.ipv4, packet.tcp) else {
            trace!("skipping packet without IPv4/TCP layers");
            return None;
        };

        let key = FlowKey::derive(
            ip.source,
            tcp.source_port,
            ip.destination,
            tcp.destination_port,
            self.mode,
        );
        self.aggregator.record(&key, u64::from(ip.total_len));
        if self.aggregator.mark_if_terminal(&key, tcp.fin, tcp.ack) {
            trace!("flow {} finished", key);
        }
        Some(key)
    }

    /// Drains `packets` until every sender is gone.
    pub fn run(&self, packets: Receiver<DecodedPacket>) {
        let mut seen: u64 = 0;
        for packet in packets.iter() {
            self.ingest(&packet);
            seen += 1;
        }
        debug!("ingest loop finished after {} packets", seen);
    }
}
