use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::features::{FeatureSet, TalentFeatures, TalentId};
use crate::scoring::MatchScorer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub talent_id: TalentId,
    pub score: f32,
}

/// Scores many talents against one project and orders them.
#[derive(Clone)]
pub struct TalentRanker {
    scorer: Arc<MatchScorer>,
    threshold: Option<f32>,
}

impl TalentRanker {
    pub fn new(scorer: Arc<MatchScorer>) -> Self {
        Self {
            scorer,
            threshold: None,
        }
    }

    /// Drop results scoring strictly below `threshold`.
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    /// Rank `talents` for `project`, best first.
    ///
    /// Talent facets missing from the payload count as empty. A talent whose
    /// scoring fails gets 0.0 and the batch carries on. Equal scores keep
    /// their input order.
    pub fn rank_talent_for_project(
        &self,
        project: &FeatureSet,
        talents: &[TalentFeatures],
    ) -> Vec<MatchResult> {
        let mut results: Vec<MatchResult> = talents
            .iter()
            .map(|talent| {
                let features = talent.features.clone().with_defaults();
                let score = match self.scorer.predict_match(project, &features) {
                    Ok(score) => {
                        debug!(talent_id = %talent.talent_id, score, "talent scored");
                        score
                    }
                    Err(err) => {
                        warn!(
                            talent_id = %talent.talent_id,
                            error = %err,
                            "talent scoring failed; using zero score"
                        );
                        0.0
                    }
                };

                MatchResult {
                    talent_id: talent.talent_id.clone(),
                    score,
                }
            })
            .collect();

        if let Some(threshold) = self.threshold {
            results.retain(|result| result.score >= threshold);
        }

        // sort_by is stable, ties stay in input order
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        info!(
            candidates = talents.len(),
            ranked = results.len(),
            threshold = ?self.threshold,
            "talent ranking finished"
        );

        results
    }
}
