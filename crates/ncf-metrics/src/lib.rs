use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use ncf_common::{MATCH_SCORE, OOV_TOTAL, PREDICTIONS_TOTAL, PREDICTION_FAILURES_TOTAL};
use tokio::runtime::Handle;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn describe_pipeline_metrics() {
    describe_counter!(OOV_TOTAL, "Category names missing from their facet mapping");
    describe_counter!(PREDICTIONS_TOTAL, "Successful match predictions");
    describe_counter!(
        PREDICTION_FAILURES_TOTAL,
        "Failed match predictions by failure kind"
    );
    describe_histogram!(MATCH_SCORE, "Adjusted match scores");
}

/// Serve Prometheus metrics on `0.0.0.0:<port>` and install the global recorder.
///
/// Must run inside a tokio runtime: the scrape listener is spawned on it.
/// Later calls return the running exporter. Returns `None` when the exporter
/// could not be started.
pub fn init_metrics(port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let Ok(runtime) = Handle::try_current() else {
        warn!(metrics_port = port, "no tokio runtime; prometheus exporter not started");
        return None;
    };

    let built = {
        let _guard = runtime.enter();
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .build()
    };
    let (recorder, exporter) = match built {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to build prometheus exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, "metrics recorder already installed");
        return None;
    }

    runtime.spawn(async move {
        // ExporterError (metrics-exporter-prometheus 0.15) implements neither Debug nor Display.
        if let Err(_err) = exporter.await {
            warn!("prometheus exporter stopped");
        }
    });

    let _ = PROMETHEUS_HANDLE.set(handle);
    describe_pipeline_metrics();
    info!(metrics_port = port, "started prometheus exporter");

    PROMETHEUS_HANDLE.get()
}
