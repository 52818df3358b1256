pub mod domain {
    use std::net::Ipv4Addr;

    /// Network layer fields the exporter cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ipv4Layer {
        pub source: Ipv4Addr,
        pub destination: Ipv4Addr,
        /// IP total length (header + payload).
        pub total_len: u16,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TcpLayer {
        pub source_port: u16,
        pub destination_port: u16,
        pub fin: bool,
        pub ack: bool,
    }

    /// A captured frame after decoding. Either layer may be missing when the
    /// frame is not IPv4 or not TCP.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct DecodedPacket {
        pub ipv4: Option<Ipv4Layer>,
        pub tcp: Option<TcpLayer>,
    }

    impl DecodedPacket {
        pub fn tcp_v4(ipv4: Ipv4Layer, tcp: TcpLayer) -> Self {
            DecodedPacket {
                ipv4: Some(ipv4),
                tcp: Some(tcp),
            }
        }
    }
}

pub mod dto {
    use serde::Serialize;

    #[derive(Debug, Serialize, Clone, PartialEq, Eq)]
    pub struct FlowRecord {
        pub key: String,
        pub bytes: u64,
    }
}
