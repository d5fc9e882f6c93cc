//! Fully connected surrogate: dense layers with ELU activations in between.

use super::{
    GradientOracle, Jacobian, OracleError, SURROGATE_OUTPUT_COUNT,
    model_file::{DenseLayer, ModelFileError, SurrogateModelFile, SurrogateModelType},
};
use crate::deck::DeckEncoding;

/// ELU with α = 1.
fn elu(z: f64) -> f64 {
    if z > 0.0 { z } else { z.exp_m1() }
}

fn elu_derivative(z: f64) -> f64 {
    if z > 0.0 { 1.0 } else { z.exp() }
}

/// Every layer but the last is followed by an ELU; the last layer is linear.
///
/// The Jacobian is computed exactly by one reverse pass per output.
#[derive(Debug, Clone)]
pub struct FullyConnectedSurrogate {
    layers: Vec<DenseLayer>,
}

impl FullyConnectedSurrogate {
    pub fn from_model_file(model: &SurrogateModelFile) -> Result<Self, ModelFileError> {
        model.expect_type(SurrogateModelType::FullyConnectedNN)?;
        model.validate()?;
        Ok(Self {
            layers: model.layers.clone(),
        })
    }

    /// Model outputs at `x`.
    #[must_use]
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        self.forward(x).1
    }

    /// Returns the pre-activations of every hidden layer and the final output.
    fn forward(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let (last, hidden) = self
            .layers
            .split_last()
            .map_or((None, &[][..]), |(last, hidden)| (Some(last), hidden));
        let mut pre_activations = Vec::with_capacity(hidden.len());
        let mut activation = x.to_vec();
        for layer in hidden {
            let z = layer.forward(&activation);
            activation = z.iter().copied().map(elu).collect();
            pre_activations.push(z);
        }
        let output = last.map_or_else(Vec::new, |layer| layer.forward(&activation));
        (pre_activations, output)
    }

    fn input_gradient(&self, pre_activations: &[Vec<f64>], output: usize) -> Vec<f64> {
        let mut grad = vec![0.0; SURROGATE_OUTPUT_COUNT];
        grad[output] = 1.0;
        for (idx, layer) in self.layers.iter().enumerate().rev() {
            grad = layer.backward(&grad);
            if idx > 0 {
                for (g, z) in grad.iter_mut().zip(&pre_activations[idx - 1]) {
                    *g *= elu_derivative(*z);
                }
            }
        }
        grad
    }
}

impl GradientOracle for FullyConnectedSurrogate {
    fn num_features(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::num_inputs)
    }

    fn evaluate_gradient(&self, encoding: &DeckEncoding) -> Result<Jacobian, OracleError> {
        let (pre_activations, _) = self.forward(encoding.as_slice());
        let rows = (0..SURROGATE_OUTPUT_COUNT)
            .map(|output| self.input_gradient(&pre_activations, output))
            .collect();
        Jacobian::from_rows(rows, self.num_features())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{SurrogateOutput, evaluate_checked};

    fn model() -> SurrogateModelFile {
        SurrogateModelFile {
            model_type: SurrogateModelType::FullyConnectedNN,
            trained_at: None,
            layers: vec![
                DenseLayer {
                    weights: vec![vec![1.0, -1.0], vec![0.5, 2.0], vec![-2.0, 0.25]],
                    bias: vec![0.1, -0.3],
                },
                DenseLayer {
                    weights: vec![vec![1.0, 0.5, -1.0], vec![-0.5, 2.0, 0.75]],
                    bias: vec![0.0, 1.0, -1.0],
                },
            ],
        }
    }

    #[test]
    fn test_elu() {
        assert_eq!(elu(2.0), 2.0);
        assert!((elu(-1.0) - (-0.632_120_558_8)).abs() < 1e-9);
        assert_eq!(elu_derivative(3.0), 1.0);
        assert_eq!(elu_derivative(0.0), 1.0);
        assert!((elu_derivative(-1.0) - 0.367_879_441_2).abs() < 1e-9);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let oracle = FullyConnectedSurrogate::from_model_file(&model()).unwrap();
        let x = vec![2.0, 0.0, 1.0];
        let jacobian = evaluate_checked(&oracle, &DeckEncoding::new(x.clone())).unwrap();

        let h = 1e-6;
        for feature in 0..x.len() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[feature] += h;
            minus[feature] -= h;
            let (y_plus, y_minus) = (oracle.predict(&plus), oracle.predict(&minus));
            for output in SurrogateOutput::ALL {
                let numeric = (y_plus[output.row()] - y_minus[output.row()]) / (2.0 * h);
                let analytic = jacobian.row(output)[feature];
                assert!(
                    (numeric - analytic).abs() < 1e-5,
                    "{output} / feature {feature}: numeric {numeric}, analytic {analytic}"
                );
            }
        }
    }

    #[test]
    fn test_single_layer_is_linear() {
        let mut model = model();
        model.layers.remove(0);
        let oracle = FullyConnectedSurrogate::from_model_file(&model).unwrap();
        let jacobian = oracle
            .evaluate_gradient(&DeckEncoding::new(vec![1.0, 1.0]))
            .unwrap();
        assert_eq!(jacobian.fitness_gradient(), &[1.0, -0.5]);
    }
}
