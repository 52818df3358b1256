// Frame decoding for the capture thread. Only the handful of IPv4/TCP fields
// the flow table needs are pulled out; everything else is ignored.

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use thiserror::Error;

use crate::models::domain::{DecodedPacket, Ipv4Layer, TcpLayer};

/// Link layer framing of the captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Linux "cooked" capture, used for the `any` device.
    LinuxSll,
    /// No link header, packet starts at the IP header.
    RawIp,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed packet: {0}")]
    Malformed(String),
}

pub fn decode(link: LinkLayer, data: &[u8]) -> Result<DecodedPacket, DecodeError> {
    let sliced = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(data),
        LinkLayer::LinuxSll => SlicedPacket::from_linux_sll(data),
        LinkLayer::RawIp => SlicedPacket::from_ip(data),
    }
    .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let ipv4 = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            Some(Ipv4Layer {
                source: header.source_addr(),
                destination: header.destination_addr(),
                total_len: header.total_len(),
            })
        }
        _ => None,
    };

    let tcp = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => Some(TcpLayer {
            source_port: tcp.source_port(),
            destination_port: tcp.destination_port(),
            fin: tcp.fin(),
            ack: tcp.ack(),
        }),
        _ => None,
    };

    Ok(DecodedPacket { ipv4, tcp })
}
