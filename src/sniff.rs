// src/sniff.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use pcap::{Active, Capture, Linktype};
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::error::{ExporterError, Result};
use crate::models::domain::DecodedPacket;
use crate::parser::{self, LinkLayer};

/// Opens the device, applies the filter and resolves the link type.
///
/// Runs on the caller's thread so that a missing device or a bad filter stops
/// the process before anything is served.
pub fn open_capture(config: &CaptureConfig) -> Result<(Capture<Active>, LinkLayer)> {
    let mut cap = create_capture(config)?;
    configure_capture(&mut cap, &config.filter)?;
    let link = link_layer(cap.get_datalink())?;

    info!("Capturing from {}, using filter {}", config.interface, config.filter);
    Ok((cap, link))
}

fn create_capture(config: &CaptureConfig) -> Result<Capture<Active>> {
    let timeout_ms = i32::try_from(config.read_timeout.as_millis()).unwrap_or(i32::MAX);

    Ok(Capture::from_device(config.interface.as_str())?
        .promisc(config.promisc)
        .snaplen(config.snaplen)
        .timeout(timeout_ms)
        .open()?)
}

fn configure_capture(cap: &mut Capture<Active>, filter: &str) -> Result<()> {
    cap.filter(filter, true)?;
    Ok(())
}

pub fn link_layer(linktype: Linktype) -> Result<LinkLayer> {
    match linktype {
        Linktype::ETHERNET => Ok(LinkLayer::Ethernet),
        Linktype::LINUX_SLL => Ok(LinkLayer::LinuxSll),
        Linktype::RAW | Linktype::IPV4 => Ok(LinkLayer::RawIp),
        other => Err(ExporterError::UnsupportedLinkType(other.0)),
    }
}

/// Forwards decoded packets until `running` is cleared or the receiving side
/// goes away. Read timeouts are retried; any other pcap error ends the capture.
pub fn process_packets(
    mut cap: Capture<Active>,
    link: LinkLayer,
    sender: Sender<DecodedPacket>,
    running: Arc<AtomicBool>,
) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        let packet = match cap.next() {
            Ok(packet) => packet,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => return Err(e.into()),
        };

        let decoded = match parser::decode(link, packet.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("Error decoding some part of the packet: {}", e);
                continue;
            }
        };

        if sender.send(decoded).is_err() {
            debug!("ingest side closed, stopping capture");
            break;
        }
    }
    Ok(())
}
