//! Exported surrogate model weights.
//!
//! Trained surrogate models are exported as JSON, one file per checkpoint:
//!
//! ```json
//! {
//!   "model_type": "FullyConnectedNN",
//!   "trained_at": "2024-05-01T12:00:00Z",
//!   "layers": [
//!     { "weights": [[0.1, -0.2], [0.3, 0.0]], "bias": [0.0, 0.5] }
//!   ]
//! }
//! ```
//!
//! `weights[i][o]` connects input `i` to output `o`, so a layer maps `x` to
//! `z[o] = bias[o] + Σ_i x[i]·weights[i][o]`. The last layer must have
//! [`SURROGATE_OUTPUT_COUNT`] outputs.

use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SURROGATE_OUTPUT_COUNT;

/// Architecture of a surrogate model, as named in the experiment configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
pub enum SurrogateModelType {
    LinearModel,
    FullyConnectedNN,
    /// Permutation-invariant model over card embeddings; its input is not a
    /// deck encoding, so it has no gradient backend.
    DeepSetModel,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ModelFileError {
    #[display("failed to open model file {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[display("failed to parse model file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("model has no layers")]
    NoLayers,
    #[display("layer {layer}: weight row {row} has {actual} outputs, expected {expected}")]
    RaggedWeights {
        layer: usize,
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[display("layer {layer} has no inputs or no outputs")]
    EmptyLayer { layer: usize },
    #[display("layer {layer} takes {actual} inputs but the previous layer has {expected} outputs")]
    LayerMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },
    #[display("model has {actual} outputs, expected {SURROGATE_OUTPUT_COUNT}")]
    OutputCount { actual: usize },
    #[display("model has {actual} input features, card pool has {expected}")]
    InputCount { expected: usize, actual: usize },
    #[display("{found} model loaded where {expected} was configured")]
    TypeMismatch {
        expected: SurrogateModelType,
        found: SurrogateModelType,
    },
    #[display("{model_type} expects {expected} dense layer(s), model file has {actual}")]
    LayerCount {
        model_type: SurrogateModelType,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.weights.len()
    }

    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.bias.len()
    }

    /// Pre-activation output `z` for input `x`.
    #[must_use]
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        let mut z = self.bias.clone();
        for (xi, row) in x.iter().zip(&self.weights) {
            if *xi == 0.0 {
                continue;
            }
            for (zo, w) in z.iter_mut().zip(row) {
                *zo += xi * w;
            }
        }
        z
    }

    /// Pulls a gradient with respect to this layer's outputs back to its inputs.
    #[must_use]
    pub fn backward(&self, grad_output: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|row| row.iter().zip(grad_output).map(|(w, g)| w * g).sum())
            .collect()
    }

    pub(crate) fn validate(&self, layer: usize) -> Result<(), ModelFileError> {
        let expected = self.num_outputs();
        for (row, weights) in self.weights.iter().enumerate() {
            if weights.len() != expected {
                return Err(ModelFileError::RaggedWeights {
                    layer,
                    row,
                    expected,
                    actual: weights.len(),
                });
            }
        }
        if self.weights.is_empty() || expected == 0 {
            return Err(ModelFileError::EmptyLayer { layer });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurrogateModelFile {
    pub model_type: SurrogateModelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    pub layers: Vec<DenseLayer>,
}

impl SurrogateModelFile {
    pub fn open<P>(path: P) -> Result<Self, ModelFileError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ModelFileError::Open {
            path: path.to_owned(),
            source,
        })?;
        let model: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            ModelFileError::Parse {
                path: path.to_owned(),
                source,
            }
        })?;
        model.validate()?;
        match model.trained_at {
            Some(trained_at) => log::info!(
                "Loaded {} ({} layers, trained at {trained_at}) from {}",
                model.model_type,
                model.layers.len(),
                path.display()
            ),
            None => log::info!(
                "Loaded {} ({} layers) from {}",
                model.model_type,
                model.layers.len(),
                path.display()
            ),
        }
        Ok(model)
    }

    /// Checks that the layers chain together and end in the surrogate outputs.
    pub fn validate(&self) -> Result<(), ModelFileError> {
        let Some(last) = self.layers.last() else {
            return Err(ModelFileError::NoLayers);
        };
        for (idx, layer) in self.layers.iter().enumerate() {
            layer.validate(idx)?;
        }
        for (idx, pair) in self.layers.windows(2).enumerate() {
            if pair[1].num_inputs() != pair[0].num_outputs() {
                return Err(ModelFileError::LayerMismatch {
                    layer: idx + 1,
                    expected: pair[0].num_outputs(),
                    actual: pair[1].num_inputs(),
                });
            }
        }
        if last.num_outputs() != SURROGATE_OUTPUT_COUNT {
            return Err(ModelFileError::OutputCount {
                actual: last.num_outputs(),
            });
        }
        Ok(())
    }

    /// Input width of the first layer.
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::num_inputs)
    }

    pub(crate) fn expect_type(&self, expected: SurrogateModelType) -> Result<(), ModelFileError> {
        if self.model_type != expected {
            return Err(ModelFileError::TypeMismatch {
                expected,
                found: self.model_type,
            });
        }
        Ok(())
    }
}
