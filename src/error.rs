use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExporterError>;

/// Problems with the command line / environment, detected before capture starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no capture interface given")]
    EmptyInterface,

    #[error("pcap filter must not be empty")]
    EmptyFilter,

    #[error("invalid listen address '{addr}': {source}")]
    InvalidListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("snapshot length must be greater than zero")]
    ZeroSnaplen,
}

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("http server error: {0}")]
    Server(String),
}
