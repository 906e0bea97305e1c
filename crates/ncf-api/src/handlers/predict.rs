use axum::{extract::rejection::JsonRejection, extract::State, Json};
use ncf_common::FeatureSet;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub project: FeatureSet,
    pub talent: FeatureSet,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub score: f32,
}

pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = payload?;
    let scorer = state.scorer.clone();

    let score = tokio::task::spawn_blocking(move || {
        scorer.predict_match(&request.project, &request.talent)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("prediction task failed: {err}")))??;

    info!(score, "match predicted");
    Ok(Json(PredictResponse { score }))
}
