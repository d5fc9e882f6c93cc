//! Linear surrogate: one dense layer, no activation.

use super::{
    GradientOracle, Jacobian, OracleError, SURROGATE_OUTPUT_COUNT,
    model_file::{DenseLayer, ModelFileError, SurrogateModelFile, SurrogateModelType},
};
use crate::deck::DeckEncoding;

/// `y = Wᵀx + b`. The Jacobian is `Wᵀ` at every point.
#[derive(Debug, Clone)]
pub struct LinearSurrogate {
    jacobian: Jacobian,
}

impl LinearSurrogate {
    pub fn new(layer: &DenseLayer) -> Result<Self, ModelFileError> {
        layer.validate(0)?;
        if layer.num_outputs() != SURROGATE_OUTPUT_COUNT {
            return Err(ModelFileError::OutputCount {
                actual: layer.num_outputs(),
            });
        }
        let rows = (0..SURROGATE_OUTPUT_COUNT)
            .map(|output| layer.weights.iter().map(|row| row[output]).collect())
            .collect();
        let jacobian = Jacobian::from_rows(rows, layer.num_inputs()).map_err(|_| {
            ModelFileError::EmptyLayer { layer: 0 }
        })?;
        Ok(Self { jacobian })
    }

    pub fn from_model_file(model: &SurrogateModelFile) -> Result<Self, ModelFileError> {
        model.expect_type(SurrogateModelType::LinearModel)?;
        model.validate()?;
        let [layer] = model.layers.as_slice() else {
            return Err(ModelFileError::LayerCount {
                model_type: model.model_type,
                expected: 1,
                actual: model.layers.len(),
            });
        };
        Self::new(layer)
    }
}

impl GradientOracle for LinearSurrogate {
    fn num_features(&self) -> usize {
        self.jacobian.num_features()
    }

    fn evaluate_gradient(&self, _encoding: &DeckEncoding) -> Result<Jacobian, OracleError> {
        Ok(self.jacobian.clone())
    }
}
