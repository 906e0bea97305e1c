pub mod candle_model;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::info;

use crate::facet::Facet;

pub use candle_model::CandleNcfModel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load model from {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
    #[error("model weights are missing tensor {0}")]
    MissingTensor(String),
    #[error("model shape mismatch: {0}")]
    Shape(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Which entity a model input slot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Project,
    Talent,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Project, Side::Talent];

    pub fn prefix(&self) -> &'static str {
        match self {
            Side::Project => "proj",
            Side::Talent => "tal",
        }
    }
}

/// Name of a model input slot, e.g. `input_proj_platform`.
pub fn input_name(side: Side, facet: Facet) -> String {
    format!("input_{}_{}", side.prefix(), facet.as_str())
}

/// The ten encoded vectors fed to the model, indexed by facet slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInput {
    pub project: [Vec<u32>; 5],
    pub talent: [Vec<u32>; 5],
}

impl ModelInput {
    pub fn get(&self, side: Side, facet: Facet) -> &[u32] {
        match side {
            Side::Project => &self.project[facet.slot()],
            Side::Talent => &self.talent[facet.slot()],
        }
    }

    /// Slots in model order: project facets, then talent facets.
    pub fn slots(&self) -> impl Iterator<Item = (Side, Facet, &[u32])> + '_ {
        Side::BOTH.into_iter().flat_map(move |side| {
            Facet::ALL
                .into_iter()
                .map(move |facet| (side, facet, self.get(side, facet)))
        })
    }
}

/// Black-box scorer: ten integer vectors in, one compatibility score out.
pub trait MatchModel: Send + Sync {
    /// Implementation name ("candle", "lazy", ...).
    fn name(&self) -> &'static str;

    fn version(&self) -> &str {
        "v1"
    }

    fn predict(&self, input: &ModelInput) -> Result<f32, ModelError>;
}

type ModelLoader = Box<dyn Fn() -> Result<Arc<dyn MatchModel>, ModelError> + Send + Sync>;

/// Defers loading until the first prediction.
///
/// `OnceCell::get_or_try_init` blocks concurrent callers while one of them
/// loads, so the weights are read at most once per successful load. A failed
/// load leaves the cell empty and the next call retries.
pub struct LazyModel {
    cell: OnceCell<Arc<dyn MatchModel>>,
    loader: ModelLoader,
}

impl LazyModel {
    pub fn new(
        loader: impl Fn() -> Result<Arc<dyn MatchModel>, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Lazy handle over safetensors weights at `path`.
    pub fn candle(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self::new(move || {
            let model: Arc<dyn MatchModel> = Arc::new(CandleNcfModel::load(&path)?);
            Ok(model)
        })
    }

    pub fn get(&self) -> Result<&Arc<dyn MatchModel>, ModelError> {
        self.cell.get_or_try_init(|| {
            info!("loading match model on first use");
            let model = (self.loader)()?;
            info!(model = model.name(), version = model.version(), "match model loaded");
            Ok(model)
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl MatchModel for LazyModel {
    fn name(&self) -> &'static str {
        "lazy"
    }

    fn version(&self) -> &str {
        self.cell.get().map(|model| model.version()).unwrap_or("unloaded")
    }

    fn predict(&self, input: &ModelInput) -> Result<f32, ModelError> {
        self.get()?.predict(input)
    }
}
