use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use crossbeam_channel::unbounded;
use tokio::sync::{watch, Notify};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcp_exporter::aggregator::FlowAggregator;
use tcp_exporter::config::{Cli, Config};
use tcp_exporter::ingest::Ingestor;
use tcp_exporter::metrics::PrometheusSink;
use tcp_exporter::publish::Publisher;
use tcp_exporter::server::{self, AppState};
use tcp_exporter::sniff;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;
    let (cap, link) = sniff::open_capture(&config.capture)?;

    let aggregator = Arc::new(FlowAggregator::new());
    let sink = Arc::new(PrometheusSink::new()?);
    let publisher = Publisher::new(aggregator.clone(), sink.clone(), config.verbose);
    let running = Arc::new(AtomicBool::new(true));

    let signalled = Arc::new(Notify::new());
    {
        let signalled = signalled.clone();
        ctrlc::set_handler(move || signalled.notify_one())?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Some(period) = config.publish_interval {
        let publisher = publisher.clone();
        tokio::spawn(async move { publisher.run(period, shutdown_rx).await });
    }

    let (tx, rx) = unbounded();
    let capture_running = running.clone();
    thread::spawn(move || {
        if let Err(e) = sniff::process_packets(cap, link, tx, capture_running) {
            error!("Packet capture error: {}", e);
        }
    });

    let ingestor = Ingestor::new(aggregator.clone(), config.mode);
    thread::spawn(move || ingestor.run(rx));

    let state = AppState {
        sink,
        aggregator,
        command_line: std::env::args().collect::<Vec<_>>().join(" "),
        interface: config.capture.interface.clone(),
        filter: config.capture.filter.clone(),
    };

    let served = tokio::select! {
        res = server::serve(config.listen, state) => res,
        _ = signalled.notified() => Ok(()),
    };

    running.store(false, Ordering::SeqCst);
    let _ = shutdown_tx.send(true);
    let report = publisher.flush_on_shutdown();
    info!(emitted = report.emitted, evicted = report.evicted, "final flush done");

    served?;
    Ok(())
}
