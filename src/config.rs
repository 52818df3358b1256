//! Command line / environment configuration.
//!
//! Every flag can also be set through a `TCP_EXPORTER_*` environment variable
//! (a `.env` file in the working directory is honoured by the binary).
//! `Cli` is what clap parses; `Config::from_cli` validates it so that a bad
//! setup fails before the capture device is opened.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;
use crate::flow::AggregationMode;

pub const DEFAULT_SNAPLEN: i32 = 96;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone)]
#[command(name = "tcp-exporter", author, version, about)]
pub struct Cli {
    /// Interface to sniff
    #[arg(short = 'i', long, env = "TCP_EXPORTER_INTERFACE", default_value = "en0")]
    pub interface: String,

    /// pcap (BPF) filter
    #[arg(short = 'f', long, env = "TCP_EXPORTER_FILTER", default_value = "tcp")]
    pub filter: String,

    /// Publish interval in seconds, 0 or less disables periodic publishing
    #[arg(
        short = 'd',
        long,
        env = "TCP_EXPORTER_INTERVAL",
        default_value_t = 5,
        allow_negative_numbers = true
    )]
    pub interval: i64,

    /// Group both directions of a TCP conversation together
    #[arg(short = 'g', long, env = "TCP_EXPORTER_GROUP")]
    pub group: bool,

    /// Log all flow values on every publish
    #[arg(short = 'v', long, env = "TCP_EXPORTER_VERBOSE")]
    pub verbose: bool,

    /// Address and port to serve HTTP on (":9097" listens on all interfaces)
    #[arg(short = 'l', long, env = "TCP_EXPORTER_LISTEN", default_value = ":9097")]
    pub listen: String,

    /// Bytes captured per packet
    #[arg(long, env = "TCP_EXPORTER_SNAPLEN", default_value_t = DEFAULT_SNAPLEN)]
    pub snaplen: i32,

    /// Put the interface in promiscuous mode
    #[arg(long, env = "TCP_EXPORTER_PROMISC")]
    pub promisc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub interface: String,
    pub filter: String,
    pub snaplen: i32,
    pub promisc: bool,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub capture: CaptureConfig,
    pub mode: AggregationMode,
    /// `None` when periodic publishing is turned off.
    pub publish_interval: Option<Duration>,
    pub verbose: bool,
    pub listen: SocketAddr,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.interface.trim().is_empty() {
            return Err(ConfigError::EmptyInterface);
        }
        if cli.filter.trim().is_empty() {
            return Err(ConfigError::EmptyFilter);
        }
        if cli.snaplen <= 0 {
            return Err(ConfigError::ZeroSnaplen);
        }

        let publish_interval = u64::try_from(cli.interval)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Config {
            capture: CaptureConfig {
                interface: cli.interface.clone(),
                filter: cli.filter.clone(),
                snaplen: cli.snaplen,
                promisc: cli.promisc,
                read_timeout: DEFAULT_READ_TIMEOUT,
            },
            mode: AggregationMode::from_group_flag(cli.group),
            publish_interval,
            verbose: cli.verbose,
            listen: parse_listen_addr(&cli.listen)?,
        })
    }
}

/// Accepts `host:port` as well as the bare `:port` form.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let full = if addr.starts_with(':') {
        format!("{}{}", Ipv4Addr::UNSPECIFIED, addr)
    } else {
        addr.to_string()
    };
    full.parse().map_err(|source| ConfigError::InvalidListenAddr {
        addr: addr.to_string(),
        source,
    })
}
