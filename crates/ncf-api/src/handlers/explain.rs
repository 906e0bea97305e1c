use axum::{extract::rejection::JsonRejection, Json};
use ncf_common::{explain_match, FeatureSet, MatchExplanation};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub project: FeatureSet,
    pub talent: FeatureSet,
}

pub async fn explain(
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> Result<Json<MatchExplanation>, ApiError> {
    let Json(request) = payload?;
    let explanation = explain_match(&request.project, &request.talent);
    debug!(explanation = ?explanation, "match explained");
    Ok(Json(explanation))
}
