use metrics::{counter, histogram};
use tracing::debug;

use crate::facet::Facet;
use crate::scoring::PipelineError;

pub const OOV_TOTAL: &str = "ncf_oov_total";
pub const PREDICTIONS_TOTAL: &str = "ncf_predictions_total";
pub const PREDICTION_FAILURES_TOTAL: &str = "ncf_prediction_failures_total";
pub const MATCH_SCORE: &str = "ncf_match_score";

/// Hooks the pipeline calls for out-of-vocabulary tags and score outcomes.
pub trait PipelineObserver: Send + Sync {
    fn out_of_vocabulary(&self, _facet: Facet, _name: &str) {}

    fn scored(&self, _score: f32) {}

    fn scoring_failed(&self, _error: &PipelineError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Publishes pipeline events through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl PipelineObserver for MetricsObserver {
    fn out_of_vocabulary(&self, facet: Facet, name: &str) {
        debug!(facet = %facet, tag = name, "tag not in facet mapping; using oov index");
        counter!(OOV_TOTAL, "facet" => facet.as_str()).increment(1);
    }

    fn scored(&self, score: f32) {
        counter!(PREDICTIONS_TOTAL).increment(1);
        histogram!(MATCH_SCORE).record(f64::from(score));
    }

    fn scoring_failed(&self, error: &PipelineError) {
        counter!(PREDICTION_FAILURES_TOTAL, "kind" => error.kind()).increment(1);
    }
}
