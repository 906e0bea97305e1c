//! Feature encoding, scoring and ranking for the NCF talent matching service.

pub mod db;
pub mod encoder;
pub mod explain;
pub mod facet;
pub mod features;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod observer;
pub mod ranking;
pub mod scoring;

pub use encoder::{encode_and_pad, PAD_INDEX};
pub use explain::{explain_match, FacetCoverage, MatchExplanation};
pub use facet::Facet;
pub use features::{FeatureSet, TalentFeatures, TalentId};
pub use mapping::{FacetMapping, FacetVocabulary, MappingError, MappingProvider, MaxLengthTable};
pub use model::{CandleNcfModel, LazyModel, MatchModel, ModelError, ModelInput};
pub use observer::{
    MetricsObserver, NoopObserver, PipelineObserver, MATCH_SCORE, OOV_TOTAL,
    PREDICTIONS_TOTAL, PREDICTION_FAILURES_TOTAL,
};
pub use ranking::{MatchResult, TalentRanker};
pub use scoring::{AdjustmentKind, MatchScorer, PipelineError, ScoreAdjustment};
