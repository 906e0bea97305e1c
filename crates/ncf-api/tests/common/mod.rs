#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use ncf_api::{AppConfig, AppState, ModelHandle};
use ncf_common::{
    Facet, FacetMapping, FacetVocabulary, MappingProvider, MatchModel, MaxLengthTable, ModelError,
    ModelInput,
};
use serde_json::Value;
use tower::ServiceExt;

/// Scores a pair by the first talent tools index divided by ten.
pub struct ToolsIndexModel;

impl MatchModel for ToolsIndexModel {
    fn name(&self) -> &'static str {
        "tools-index"
    }

    fn predict(&self, input: &ModelInput) -> Result<f32, ModelError> {
        let first = input.talent[Facet::Tools.slot()][0];
        if first == 9 {
            return Err(ModelError::Inference("poisoned index".into()));
        }
        Ok(first as f32 / 10.0)
    }
}

/// docker=1, k8s=2, terraform=3, broken=9 (fails in [`ToolsIndexModel`]).
pub fn vocabulary() -> Arc<dyn MappingProvider> {
    let vocabulary = FacetVocabulary::build(
        |facet| match facet {
            Facet::Platform => FacetMapping::new(facet, [("web", 1), ("mobile", 2)]),
            Facet::Product => FacetMapping::new(facet, [("saas", 1)]),
            Facet::Role => FacetMapping::new(facet, [("backend", 1), ("frontend", 2)]),
            Facet::Language => FacetMapping::new(facet, [("python", 1), ("rust", 2)]),
            Facet::Tools => FacetMapping::new(
                facet,
                [("docker", 1), ("k8s", 2), ("terraform", 3), ("broken", 9)],
            ),
        },
        Some(MaxLengthTable::uniform(3)),
    )
    .unwrap();
    Arc::new(vocabulary)
}

pub fn app_with(config: AppConfig, model: ModelHandle) -> (Router, ncf_api::SharedState) {
    let state = Arc::new(AppState::new(config, vocabulary(), model).unwrap());
    (ncf_api::create_router(state.clone()), state)
}

pub fn app() -> Router {
    app_with(
        AppConfig::for_tests(),
        ModelHandle::Eager(Arc::new(ToolsIndexModel)),
    )
    .0
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
