use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, Linear, Module};
use tracing::{debug, info};

use super::{input_name, MatchModel, ModelError, ModelInput, Side};
use crate::facet::Facet;

struct EmbeddingSlot {
    name: String,
    embedding: Embedding,
    rows: usize,
}

/// NCF scorer evaluated with candle from a safetensors checkpoint.
///
/// Expected tensors:
/// - `{proj|tal}_{facet}.weight` `[vocab, dim]` embedding table per input slot
/// - `dense_{i}.weight` `[out, in]` / `dense_{i}.bias` `[out]` for i = 0.. (ReLU)
/// - `output.weight` `[1, in]` / `output.bias` `[1]` (sigmoid)
///
/// Each slot is embedded and mean-pooled over the sequence, the ten pooled
/// vectors are concatenated and run through the dense stack.
pub struct CandleNcfModel {
    version: String,
    device: Device,
    slots: Vec<EmbeddingSlot>,
    hidden: Vec<Linear>,
    output: Linear,
}

fn take_tensor(
    tensors: &mut HashMap<String, Tensor>,
    name: &str,
) -> Result<Tensor, ModelError> {
    let tensor = tensors
        .remove(name)
        .ok_or_else(|| ModelError::MissingTensor(name.to_string()))?;
    Ok(tensor.to_dtype(DType::F32)?)
}

fn take_linear(
    tensors: &mut HashMap<String, Tensor>,
    prefix: &str,
    expected_in: usize,
) -> Result<(Linear, usize), ModelError> {
    let weight = take_tensor(tensors, &format!("{prefix}.weight"))?;
    let bias = take_tensor(tensors, &format!("{prefix}.bias"))?;

    let (out_features, in_features) = weight.dims2()?;
    if in_features != expected_in {
        return Err(ModelError::Shape(format!(
            "{prefix} expects {in_features} inputs but receives {expected_in}"
        )));
    }
    if bias.dims1()? != out_features {
        return Err(ModelError::Shape(format!(
            "{prefix}.bias length does not match {out_features} outputs"
        )));
    }

    Ok((Linear::new(weight, Some(bias)), out_features))
}

impl CandleNcfModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let device = Device::Cpu;
        let mut tensors =
            candle_core::safetensors::load(path, &device).map_err(|err| ModelError::Load {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;

        let mut slots = Vec::with_capacity(10);
        let mut features = 0usize;
        for side in Side::BOTH {
            for facet in Facet::ALL {
                let name = format!("{}_{}.weight", side.prefix(), facet.as_str());
                let weight = take_tensor(&mut tensors, &name)?;
                let (rows, dim) = weight.dims2()?;
                features += dim;
                slots.push(EmbeddingSlot {
                    name: input_name(side, facet),
                    embedding: Embedding::new(weight, dim),
                    rows,
                });
            }
        }

        let mut hidden = Vec::new();
        while tensors.contains_key(&format!("dense_{}.weight", hidden.len())) {
            let prefix = format!("dense_{}", hidden.len());
            let (layer, out_features) = take_linear(&mut tensors, &prefix, features)?;
            hidden.push(layer);
            features = out_features;
        }

        let (output, out_features) = take_linear(&mut tensors, "output", features)?;
        if out_features != 1 {
            return Err(ModelError::Shape(format!(
                "output layer must produce one score, produces {out_features}"
            )));
        }

        let version = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("unknown")
            .to_string();

        info!(
            path = %path.display(),
            version = %version,
            hidden_layers = hidden.len(),
            unused_tensors = tensors.len(),
            "loaded candle ncf model"
        );

        Ok(Self {
            version,
            device,
            slots,
            hidden,
            output,
        })
    }

    fn pool_slot(&self, slot: &EmbeddingSlot, ids: &[u32]) -> Result<Tensor, ModelError> {
        if let Some(bad) = ids.iter().find(|id| **id as usize >= slot.rows) {
            return Err(ModelError::Inference(format!(
                "index {bad} outside {} embedding table of {} rows",
                slot.name, slot.rows
            )));
        }
        if ids.is_empty() {
            return Err(ModelError::Inference(format!("{} received an empty sequence", slot.name)));
        }

        let ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let embedded = slot.embedding.forward(&ids)?;
        Ok(embedded.mean(1)?)
    }
}

impl MatchModel for CandleNcfModel {
    fn name(&self) -> &'static str {
        "candle"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, input: &ModelInput) -> Result<f32, ModelError> {
        let mut pooled = Vec::with_capacity(self.slots.len());
        for (slot, (_, _, ids)) in self.slots.iter().zip(input.slots()) {
            pooled.push(self.pool_slot(slot, ids)?);
        }

        let mut hidden = Tensor::cat(&pooled, 1)?;
        for layer in &self.hidden {
            hidden = layer.forward(&hidden)?.relu()?;
        }

        let logits = self.output.forward(&hidden)?;
        let scores = candle_nn::ops::sigmoid(&logits)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let score = scores
            .first()
            .copied()
            .ok_or_else(|| ModelError::Inference("model produced no output".into()))?;

        debug!(score, "candle ncf prediction");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const DIM: usize = 2;
    const VOCAB: usize = 4;

    /// Embeddings map index i to [i, 0]; one output unit sums everything.
    fn write_checkpoint(dir: &Path, with_hidden: bool) -> PathBuf {
        let device = Device::Cpu;
        let mut tensors = HashMap::new();

        let table: Vec<f32> = (0..VOCAB).flat_map(|i| [i as f32, 0.0]).collect();
        for side in Side::BOTH {
            for facet in Facet::ALL {
                tensors.insert(
                    format!("{}_{}.weight", side.prefix(), facet.as_str()),
                    Tensor::from_vec(table.clone(), (VOCAB, DIM), &device).unwrap(),
                );
            }
        }

        let mut features = DIM * 10;
        if with_hidden {
            tensors.insert(
                "dense_0.weight".to_string(),
                Tensor::ones((3, features), DType::F32, &device).unwrap(),
            );
            tensors.insert(
                "dense_0.bias".to_string(),
                Tensor::zeros(3, DType::F32, &device).unwrap(),
            );
            features = 3;
        }

        tensors.insert(
            "output.weight".to_string(),
            Tensor::ones((1, features), DType::F32, &device).unwrap(),
        );
        tensors.insert(
            "output.bias".to_string(),
            Tensor::zeros(1, DType::F32, &device).unwrap(),
        );

        let path = dir.join("ncf_test.safetensors");
        candle_core::safetensors::save(&tensors, &path).unwrap();
        path
    }

    fn input_with(project_platform: Vec<u32>) -> ModelInput {
        let zeros = || vec![0u32, 0];
        let mut input = ModelInput {
            project: std::array::from_fn(|_| zeros()),
            talent: std::array::from_fn(|_| zeros()),
        };
        input.project[Facet::Platform.slot()] = project_platform;
        input
    }

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn all_padding_scores_one_half() {
        let dir = tempfile::tempdir().unwrap();
        let model = CandleNcfModel::load(&write_checkpoint(dir.path(), false)).unwrap();

        let score = model.predict(&input_with(vec![0, 0])).unwrap();

        assert!((score - 0.5).abs() < 1e-6);
        assert_eq!(model.version(), "ncf_test");
    }

    #[test]
    fn mean_pools_each_slot() {
        let dir = tempfile::tempdir().unwrap();
        let model = CandleNcfModel::load(&write_checkpoint(dir.path(), false)).unwrap();

        // mean([1, 3]) = 2 on the first embedding dimension
        let score = model.predict(&input_with(vec![1, 3])).unwrap();

        assert!((score - sigmoid(2.0)).abs() < 1e-6);
    }

    #[test]
    fn hidden_layers_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let model = CandleNcfModel::load(&write_checkpoint(dir.path(), true)).unwrap();

        // pooled sum 2 -> three relu units of 2 -> output 6
        let score = model.predict(&input_with(vec![1, 3])).unwrap();

        assert!((score - sigmoid(6.0)).abs() < 1e-5);
    }

    #[test]
    fn index_outside_table_is_an_inference_error() {
        let dir = tempfile::tempdir().unwrap();
        let model = CandleNcfModel::load(&write_checkpoint(dir.path(), false)).unwrap();

        let result = model.predict(&input_with(vec![VOCAB as u32, 0]));

        match result {
            Err(ModelError::Inference(message)) => assert!(message.contains("input_proj_platform")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CandleNcfModel::load(&dir.path().join("absent.safetensors"));
        assert!(matches!(result, Err(ModelError::Load { .. })));
    }
}
