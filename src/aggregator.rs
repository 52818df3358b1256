use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::flow::FlowKey;
use crate::models::dto::FlowRecord;

#[derive(Default)]
struct FlowTable {
    registry: HashMap<FlowKey, u64>,
    completed: Vec<FlowKey>,
}

/// Per-flow byte values plus the flows seen terminating since the last publish.
///
/// Both structures sit behind one lock: the ingest thread writes, the publish
/// task snapshots and prunes, and the HTTP handler reads.
#[derive(Default)]
pub struct FlowAggregator {
    table: Mutex<FlowTable>,
}

impl FlowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FlowTable> {
        // A panic while holding the lock cannot leave the maps half-updated
        // in a way that matters to a gauge exporter.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `bytes` for `key`, replacing whatever was there. The value is the
    /// size of the latest packet of the flow, not a running total.
    pub fn record(&self, key: &FlowKey, bytes: u64) {
        self.lock().registry.insert(key.clone(), bytes);
    }

    /// Queues `key` for eviction when the packet carried both FIN and ACK.
    pub fn mark_if_terminal(&self, key: &FlowKey, fin: bool, ack: bool) -> bool {
        if !(fin && ack) {
            return false;
        }
        self.lock().completed.push(key.clone());
        true
    }

    /// Copy of every flow and its value, ordered by key.
    pub fn snapshot(&self) -> Vec<FlowRecord> {
        let table = self.lock();
        records(&table)
    }

    /// Snapshot plus the drained completion set, with the completed flows
    /// already removed, all under one lock. Every evicted key is present in
    /// the returned snapshot, and nothing recorded afterwards is lost.
    pub fn take_for_publish(&self) -> (Vec<FlowRecord>, Vec<FlowKey>) {
        let mut table = self.lock();
        let snapshot = records(&table);
        let completed = std::mem::take(&mut table.completed);
        for key in &completed {
            table.registry.remove(key);
        }
        (snapshot, completed)
    }

    pub fn drain_and_clear(&self) -> Vec<FlowKey> {
        std::mem::take(&mut self.lock().completed)
    }

    pub fn evict(&self, keys: &[FlowKey]) {
        let mut table = self.lock();
        for key in keys {
            table.registry.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_completions(&self) -> usize {
        self.lock().completed.len()
    }
}

fn records(table: &FlowTable) -> Vec<FlowRecord> {
    let mut records: Vec<FlowRecord> = table
        .registry
        .iter()
        .map(|(key, bytes)| FlowRecord {
            key: key.to_string(),
            bytes: *bytes,
        })
        .collect();
    records.sort_by(|a, b| a.key.cmp(&b.key));
    records
}
