use crate::completion::GenerationResult;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` filter, `info` by default. Logs go to stderr so stdout stays free for output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

pub fn install_prometheus(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}

pub fn record_generation(backend: &'static str, r: &GenerationResult) {
    metrics::histogram!("generation_latency_ms", "backend" => backend).record(r.latency_ms as f64);
    if let Some(n) = r.reported_input_tokens() {
        metrics::counter!("generation_input_tokens", "backend" => backend).increment(n as u64);
    }
    if let Some(n) = r.reported_output_tokens() {
        metrics::counter!("generation_output_tokens", "backend" => backend).increment(n as u64);
    }
}

pub fn record_failure(backend: &'static str, reason: &'static str) {
    metrics::counter!("generation_failures", "backend" => backend, "reason" => reason).increment(1);
}
