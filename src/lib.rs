pub mod aggregator;
pub mod config;
pub mod error;
pub mod flow;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod publish;
pub mod server;
pub mod sniff;

#[cfg(test)]
mod tests;

pub use error::{ExporterError, Result};
