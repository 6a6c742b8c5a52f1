use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use crate::pipeline::processing::batch::BatchResult;

pub const RECORDS_TOTAL: &str = "pricelist_records_total";
pub const MERGE_TOTAL: &str = "pricelist_merge_total";
pub const FILES_TOTAL: &str = "pricelist_files_total";
pub const FILE_DURATION_SECONDS: &str = "pricelist_file_duration_seconds";
pub const QUALITY_SCORE: &str = "pricelist_quality_score";

/// Install the Prometheus exporter on `port`.
///
/// Without an installed recorder every metric call below is a no-op.
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("📈 Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub fn record_batch(result: &BatchResult) {
    metrics::counter!(RECORDS_TOTAL, "status" => "valid").increment(result.valid as u64);
    metrics::counter!(RECORDS_TOTAL, "status" => "invalid").increment(result.invalid as u64);
    metrics::counter!(RECORDS_TOTAL, "status" => "warning").increment(result.with_warnings as u64);
    metrics::counter!(RECORDS_TOTAL, "status" => "duplicate").increment(result.duplicates as u64);
    metrics::histogram!(QUALITY_SCORE).record(result.quality_score as f64);
}

pub fn record_merge(action: &'static str) {
    metrics::counter!(MERGE_TOTAL, "action" => action).increment(1);
}

pub fn record_file(status: &'static str, elapsed: Duration) {
    metrics::counter!(FILES_TOTAL, "status" => status).increment(1);
    metrics::histogram!(FILE_DURATION_SECONDS).record(elapsed.as_secs_f64());
}
