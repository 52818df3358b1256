use prometheus::{GaugeVec, Opts, Registry, TextEncoder};

use crate::error::Result;

pub const METRIC_NAME: &str = "NetStat";
pub const METRIC_HELP: &str = "TCP/IP traffic stats";
pub const TRAFFIC_LABEL: &str = "traffic";

/// Where publish cycles push their numbers.
pub trait MetricsSink: Send + Sync {
    /// Adds `value` to the series labelled `key`, creating it at zero first.
    fn add(&self, key: &str, value: f64) -> Result<()>;

    /// Drops the series labelled `key` entirely.
    fn remove(&self, key: &str) -> Result<()>;
}

/// `NetStat{traffic="<flow key>"}` gauges in a dedicated registry.
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    traffic: GaugeVec,
}

impl PrometheusSink {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let traffic = GaugeVec::new(Opts::new(METRIC_NAME, METRIC_HELP), &[TRAFFIC_LABEL])?;
        registry.register(Box::new(traffic.clone()))?;

        Ok(Self { registry, traffic })
    }

    /// Text exposition format, as served on `/metrics`.
    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }

    /// Current value of one series, if it exists.
    #[cfg(test)]
    pub(crate) fn series_value(&self, key: &str) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == METRIC_NAME)
            .flat_map(|family| family.get_metric().iter())
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == TRAFFIC_LABEL && label.get_value() == key)
            })
            .map(|metric| metric.get_gauge().get_value())
    }
}

impl MetricsSink for PrometheusSink {
    fn add(&self, key: &str, value: f64) -> Result<()> {
        self.traffic.get_metric_with_label_values(&[key])?.add(value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.traffic.remove_label_values(&[key])?;
        Ok(())
    }
}
