use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{error, info};

use crate::aggregator::FlowAggregator;
use crate::error::{ExporterError, Result};
use crate::metrics::PrometheusSink;
use crate::models::dto::FlowRecord;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<PrometheusSink>,
    pub aggregator: Arc<FlowAggregator>,
    /// Shown on the landing page.
    pub command_line: String,
    pub interface: String,
    pub filter: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .route("/flows", get(flows))
        .with_state(state)
}

/// Serves until the listener fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    info!("Metrics will be exposed on {}", addr);
    axum::Server::try_bind(&addr)
        .map_err(|e| ExporterError::Server(e.to_string()))?
        .serve(router(state).into_make_service())
        .await
        .map_err(|e| ExporterError::Server(e.to_string()))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>TCP Exporter</title></head>
<body>
<h1>TCP Exporter</h1>
<h2>parameters '{}'</h2>
<h2>sniffing the network on '{}' using PCAP filter '{}'</h2>
<p><a href='/metrics'><b>Metrics</b></a></p>
<p><a href='/flows'><b>Live flows</b></a></p>
</body>
</html>
"#,
        state.command_line, state.interface, state.filter
    ))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.sink.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn flows(State(state): State<AppState>) -> Json<Vec<FlowRecord>> {
    Json(state.aggregator.snapshot())
}
