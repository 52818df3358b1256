use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::aggregator::FlowAggregator;
use crate::metrics::MetricsSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub emitted: usize,
    pub evicted: usize,
}

/// Moves aggregated flow values into the metrics sink and prunes finished flows.
#[derive(Clone)]
pub struct Publisher {
    aggregator: Arc<FlowAggregator>,
    sink: Arc<dyn MetricsSink>,
    verbose: bool,
}

impl Publisher {
    pub fn new(aggregator: Arc<FlowAggregator>, sink: Arc<dyn MetricsSink>, verbose: bool) -> Self {
        Self {
            aggregator,
            sink,
            verbose,
        }
    }

    /// One cycle: snapshot, emit, then evict whatever completed.
    ///
    /// Snapshot and eviction happen atomically, so every evicted flow is in the
    /// snapshot and its last value is emitted before its series goes away.
    /// Packets arriving while the sink is being fed wait for the next cycle.
    pub fn publish_cycle(&self) -> PublishReport {
        let (snapshot, completed) = self.aggregator.take_for_publish();

        let mut report = PublishReport::default();
        for record in &snapshot {
            if self.verbose {
                info!("{} {} bytes", record.key, record.bytes);
            }
            match self.sink.add(&record.key, record.bytes as f64) {
                Ok(()) => report.emitted += 1,
                Err(e) => warn!("Failed to publish {}: {}", record.key, e),
            }
        }

        for key in &completed {
            // Duplicate completions make the second removal fail; nothing to do.
            if let Err(e) = self.sink.remove(key.as_str()) {
                debug!("Series {} not removed: {}", key, e);
            }
        }
        report.evicted = completed.len();

        debug!(
            emitted = report.emitted,
            evicted = report.evicted,
            live = self.aggregator.len(),
            "publish cycle done"
        );
        report
    }

    /// Runs a cycle every `period` until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; the first publish should happen one period in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.verbose {
                        info!("Stats at {}", chrono::Local::now());
                    }
                    self.publish_cycle();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("publish loop stopped");
    }

    /// Last publish before the process exits. Call once.
    pub fn flush_on_shutdown(&self) -> PublishReport {
        info!("Bye!");
        self.publish_cycle()
    }
}
