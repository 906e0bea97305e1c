use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::encoder::encode_and_pad_observed;
use crate::facet::Facet;
use crate::features::FeatureSet;
use crate::mapping::MappingProvider;
use crate::model::{MatchModel, ModelError, ModelInput};
use crate::observer::{NoopObserver, PipelineObserver};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing feature: {0}")]
    MissingFeature(Facet),
    #[error("scoring failed: {0}")]
    Scoring(#[from] ModelError),
    #[error("model returned a non-finite score: {0}")]
    NonFiniteScore(f32),
}

impl PipelineError {
    /// Short label used for metrics and error codes.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingFeature(_) => "missing_feature",
            PipelineError::Scoring(_) | PipelineError::NonFiniteScore(_) => "scoring",
        }
    }
}

/// Post-processing applied to the raw model score.
pub trait ScoreAdjustment: Send + Sync {
    fn name(&self) -> &'static str;

    fn adjust(&self, raw: f32, project: &FeatureSet, talent: &FeatureSet) -> f32;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoAdjustment;

impl ScoreAdjustment for NoAdjustment {
    fn name(&self) -> &'static str {
        "none"
    }

    fn adjust(&self, raw: f32, _project: &FeatureSet, _talent: &FeatureSet) -> f32 {
        raw
    }
}

/// `raw / ln(1 + n)` where `n` is the project's raw tag count over all facets.
///
/// A project without tags keeps its raw score since `ln(1) = 0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagCountPenalty;

impl ScoreAdjustment for TagCountPenalty {
    fn name(&self) -> &'static str {
        "tag_count_penalty"
    }

    fn adjust(&self, raw: f32, project: &FeatureSet, _talent: &FeatureSet) -> f32 {
        let total = project.tag_count();
        if total == 0 {
            return raw;
        }

        let divisor = (1.0 + total as f64).ln();
        (f64::from(raw) / divisor) as f32
    }
}

/// Configuration-level selector for the score adjustment strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    #[default]
    None,
    TagCountPenalty,
}

impl AdjustmentKind {
    pub fn strategy(self) -> Arc<dyn ScoreAdjustment> {
        match self {
            AdjustmentKind::None => Arc::new(NoAdjustment),
            AdjustmentKind::TagCountPenalty => Arc::new(TagCountPenalty),
        }
    }
}

/// Encodes a project/talent pair, runs the model and adjusts the result.
#[derive(Clone)]
pub struct MatchScorer {
    mappings: Arc<dyn MappingProvider>,
    model: Arc<dyn MatchModel>,
    adjustment: Arc<dyn ScoreAdjustment>,
    observer: Arc<dyn PipelineObserver>,
}

impl MatchScorer {
    pub fn new(mappings: Arc<dyn MappingProvider>, model: Arc<dyn MatchModel>) -> Self {
        Self {
            mappings,
            model,
            adjustment: Arc::new(NoAdjustment),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_adjustment(mut self, adjustment: Arc<dyn ScoreAdjustment>) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn adjustment_name(&self) -> &'static str {
        self.adjustment.name()
    }

    /// Build the ten model input vectors: project facets, then talent facets.
    pub fn encode(
        &self,
        project: &FeatureSet,
        talent: &FeatureSet,
    ) -> Result<ModelInput, PipelineError> {
        let encode_side = |features: &FeatureSet| -> Result<[Vec<u32>; 5], PipelineError> {
            let mut encoded: [Vec<u32>; 5] = Default::default();
            for facet in Facet::ALL {
                let names = features.require(facet)?;
                encoded[facet.slot()] = encode_and_pad_observed(
                    names,
                    self.mappings.mapping(facet),
                    self.mappings.max_length(facet),
                    self.observer.as_ref(),
                );
            }
            Ok(encoded)
        };

        let project = encode_side(project)?;
        let talent = encode_side(talent)?;
        Ok(ModelInput { project, talent })
    }

    /// Score one project/talent pair. Every facet key must be present on both sides.
    pub fn predict_match(
        &self,
        project: &FeatureSet,
        talent: &FeatureSet,
    ) -> Result<f32, PipelineError> {
        let result = self.score(project, talent);
        match &result {
            Ok(score) => self.observer.scored(*score),
            Err(err) => self.observer.scoring_failed(err),
        }
        result
    }

    fn score(&self, project: &FeatureSet, talent: &FeatureSet) -> Result<f32, PipelineError> {
        let input = self.encode(project, talent)?;
        debug!(input = ?input, model = self.model.name(), "encoded match input");

        let raw = self.model.predict(&input)?;
        if !raw.is_finite() {
            warn!(raw, model = self.model.name(), "model returned a non-finite score");
            return Err(PipelineError::NonFiniteScore(raw));
        }

        let adjusted = self.adjustment.adjust(raw, project, talent);
        debug!(raw, adjusted, adjustment = self.adjustment.name(), "match scored");
        Ok(adjusted)
    }
}
