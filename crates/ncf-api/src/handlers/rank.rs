use axum::{extract::rejection::JsonRejection, extract::State, Json};
use ncf_common::{FeatureSet, MatchResult, TalentFeatures};
use serde::Deserialize;

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub project: FeatureSet,
    pub talents: Vec<TalentFeatures>,
}

/// Per-talent scoring failures never fail the request; only a malformed
/// payload does.
pub async fn rank_talent(
    State(state): State<SharedState>,
    payload: Result<Json<RankRequest>, JsonRejection>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
    let Json(request) = payload?;
    let ranker = state.ranker.clone();

    let ranked = tokio::task::spawn_blocking(move || {
        ranker.rank_talent_for_project(&request.project, &request.talents)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("ranking task failed: {err}")))?;

    Ok(Json(ranked))
}
