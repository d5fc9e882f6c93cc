//! Surrogate gradient oracles.
//!
//! A [`GradientOracle`] evaluates the Jacobian of a trained surrogate model at
//! one deck encoding: one row per model output ([`SurrogateOutput`]), one
//! column per card-pool feature. The card-order analysis only needs the
//! fitness row, but oracles always return all three outputs.
//!
//! # Backends
//!
//! - [`linear::LinearSurrogate`] - single dense layer, Jacobian is the weight matrix
//! - [`fully_connected::FullyConnectedSurrogate`] - dense layers with ELU activations
//! - [`subprocess::SubprocessOracle`] - external inference command, one process per evaluation
//! - [`time_limited::TimeLimited`] - bounds the wall-clock time of any in-process oracle
//!
//! Model weights come from the JSON export described in [`model_file`].
//!
//! # Resource lifetime
//!
//! In-process oracles only hold immutable weights, so one instance can be shared
//! by every worker. The subprocess oracle acquires its child process inside
//! [`GradientOracle::evaluate_gradient`] and reaps it before returning.

use std::{fmt, time::Duration};

use crate::deck::DeckEncoding;

pub mod fully_connected;
pub mod linear;
pub mod model_file;
pub mod subprocess;
pub mod time_limited;

/// Number of surrogate outputs (rows of every Jacobian).
pub const SURROGATE_OUTPUT_COUNT: usize = 3;

/// Outputs of the surrogate model, in row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SurrogateOutput {
    /// Fitness of the deck
    AverageHealthDifference,
    NumTurns,
    HandSize,
}

impl SurrogateOutput {
    pub const ALL: [SurrogateOutput; SURROGATE_OUTPUT_COUNT] = [
        SurrogateOutput::AverageHealthDifference,
        SurrogateOutput::NumTurns,
        SurrogateOutput::HandSize,
    ];

    #[must_use]
    pub const fn row(self) -> usize {
        match self {
            SurrogateOutput::AverageHealthDifference => 0,
            SurrogateOutput::NumTurns => 1,
            SurrogateOutput::HandSize => 2,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum OracleError {
    #[display("gradient oracle unavailable: {reason}")]
    Unavailable { reason: String },
    #[display("gradient oracle expects {expected} input features, got {actual}")]
    InputDimension { expected: usize, actual: usize },
    #[display(
        "gradient oracle returned a {rows}x{columns} Jacobian, expected {SURROGATE_OUTPUT_COUNT}x{expected_columns}"
    )]
    OutputShape {
        rows: usize,
        columns: usize,
        expected_columns: usize,
    },
    #[display("gradient evaluation exceeded {limit:?}")]
    Timeout { limit: Duration },
    #[display("gradient evaluation failed: {reason}")]
    Failed { reason: String },
}

impl OracleError {
    /// Whether the error makes every further evaluation pointless.
    ///
    /// An unreachable or misconfigured oracle aborts the whole batch; a timeout
    /// or a failed evaluation only affects the current elite.
    #[must_use]
    pub fn is_systemic(&self) -> bool {
        match self {
            OracleError::Unavailable { .. }
            | OracleError::InputDimension { .. }
            | OracleError::OutputShape { .. } => true,
            OracleError::Timeout { .. } | OracleError::Failed { .. } => false,
        }
    }
}

/// Partial derivatives of every surrogate output with respect to every input feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    num_features: usize,
    // row-major, SURROGATE_OUTPUT_COUNT rows
    values: Vec<f64>,
}

impl Jacobian {
    /// Builds a Jacobian from per-output rows, checking that there are exactly
    /// [`SURROGATE_OUTPUT_COUNT`] rows of `num_features` values each.
    pub fn from_rows(rows: Vec<Vec<f64>>, num_features: usize) -> Result<Self, OracleError> {
        let shape_error = |rows: &[Vec<f64>]| OracleError::OutputShape {
            rows: rows.len(),
            columns: rows.first().map_or(0, Vec::len),
            expected_columns: num_features,
        };
        if rows.len() != SURROGATE_OUTPUT_COUNT || rows.iter().any(|r| r.len() != num_features) {
            return Err(shape_error(&rows));
        }
        Ok(Self {
            num_features,
            values: rows.into_iter().flatten().collect(),
        })
    }

    #[must_use]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    #[must_use]
    pub fn row(&self, output: SurrogateOutput) -> &[f64] {
        let start = output.row() * self.num_features;
        &self.values[start..start + self.num_features]
    }

    /// Gradient of the fitness output (average health difference).
    #[must_use]
    pub fn fitness_gradient(&self) -> &[f64] {
        self.row(SurrogateOutput::AverageHealthDifference)
    }
}

/// Capability to evaluate the surrogate model's Jacobian at a deck encoding.
pub trait GradientOracle: fmt::Debug + Send + Sync {
    /// Number of input features (card-pool size) the model accepts.
    fn num_features(&self) -> usize;

    /// Evaluates the Jacobian of all surrogate outputs at `encoding`.
    fn evaluate_gradient(&self, encoding: &DeckEncoding) -> Result<Jacobian, OracleError>;
}

impl<O> GradientOracle for Box<O>
where
    O: GradientOracle + ?Sized,
{
    fn num_features(&self) -> usize {
        (**self).num_features()
    }

    fn evaluate_gradient(&self, encoding: &DeckEncoding) -> Result<Jacobian, OracleError> {
        (**self).evaluate_gradient(encoding)
    }
}

/// Evaluates `oracle` after checking the input length, and checks the output shape.
pub fn evaluate_checked<O>(oracle: &O, encoding: &DeckEncoding) -> Result<Jacobian, OracleError>
where
    O: GradientOracle + ?Sized,
{
    let expected = oracle.num_features();
    if encoding.len() != expected {
        return Err(OracleError::InputDimension {
            expected,
            actual: encoding.len(),
        });
    }
    let jacobian = oracle.evaluate_gradient(encoding)?;
    if jacobian.num_features() != expected {
        return Err(OracleError::OutputShape {
            rows: SURROGATE_OUTPUT_COUNT,
            columns: jacobian.num_features(),
            expected_columns: expected,
        });
    }
    Ok(jacobian)
}
