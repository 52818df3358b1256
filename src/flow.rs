// Flow keys double as the `traffic` label on the exported gauge, so their
// textual shape is part of the metric contract:
//   directional  10.0.0.1-5000-10.0.0.2-443
//   grouped      10.0.0.1-10.0.0.2-443   (client-server-service port)

use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    /// src->dst and dst->src are separate flows.
    #[default]
    Directional,
    /// Both directions of a conversation share one key, named after the lower port.
    Grouped,
}

impl AggregationMode {
    pub fn from_group_flag(group: bool) -> Self {
        if group {
            AggregationMode::Grouped
        } else {
            AggregationMode::Directional
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey(String);

impl FlowKey {
    pub fn derive(
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        mode: AggregationMode,
    ) -> Self {
        match mode {
            AggregationMode::Directional => {
                FlowKey(format!("{}-{}-{}-{}", src, src_port, dst, dst_port))
            }
            AggregationMode::Grouped => {
                // The lower port is taken as the service side. Equal ports fall
                // through to the second branch, so the packet source becomes the
                // client and the key depends on direction in that case.
                let (client, server, service_port) = if src_port < dst_port {
                    (dst, src, src_port)
                } else {
                    (src, dst, dst_port)
                };
                FlowKey(format!("{}-{}-{}", client, server, service_port))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
