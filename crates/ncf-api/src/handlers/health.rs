use axum::{extract::State, Json};
use serde_json::json;

use crate::error::ApiError;
use crate::SharedState;

pub async fn root() -> &'static str {
    "NCF matching service is running"
}

pub async fn livez() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready while not shutting down. A lazily loaded model that has not been
/// used yet still counts as ready.
pub async fn readyz(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.readiness.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(ApiError::ServiceUnavailable("shutting_down".into()));
    }

    let model = state.model.as_model();

    Ok(Json(json!({
        "status": "ok",
        "model": {
            "name": model.name(),
            "version": model.version(),
            "loaded": state.model.is_loaded(),
        },
        "mapping_source": format!("{:?}", state.config.mapping_source).to_lowercase(),
        "score_adjustment": state.scorer.adjustment_name(),
        "rank_threshold": state.ranker.threshold(),
        "application": env!("CARGO_PKG_NAME"),
    })))
}
