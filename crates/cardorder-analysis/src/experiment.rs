//! Experiment configuration and surrogate model selection.
//!
//! Every experiment log directory holds the `experiment_config.tml` it was run
//! with. Only surrogate-assisted searches have a trained model to analyze:
//!
//! ```toml
//! [Search]
//! Category = "Surrogated"
//!
//! [Surrogate]
//! Type = "FullyConnectedNN"
//! ```
//!
//! Model checkpoints are exported to
//! `surrogate_train_log/surrogate_model/model{N}/model.json` with `N` counting
//! up from 0; the highest contiguous `N` is the latest.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::oracle::{
    GradientOracle,
    fully_connected::FullyConnectedSurrogate,
    linear::LinearSurrogate,
    model_file::{ModelFileError, SurrogateModelFile, SurrogateModelType},
};

pub const EXPERIMENT_CONFIG_FILE: &str = "experiment_config.tml";
pub const SURROGATE_MODEL_DIR: &str = "surrogate_train_log/surrogate_model";
pub const MODEL_FILE: &str = "model.json";

const SURROGATED_CATEGORY: &str = "Surrogated";

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ModelLoadError {
    #[display("failed to read experiment config {}: {source}", path.display())]
    ConfigUnreadable { path: PathBuf, source: io::Error },
    #[display("failed to parse experiment config {}: {source}", path.display())]
    ConfigMalformed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[display(
        "search category is '{category}', only {SURROGATED_CATEGORY} searches have a surrogate model"
    )]
    NotSurrogated { category: String },
    #[display("experiment config has no [Surrogate] section")]
    NoSurrogateSection,
    #[display("unknown surrogate model type '{name}'")]
    UnknownModelType { name: String },
    #[display("{model_type} has no gradient backend")]
    Unsupported { model_type: SurrogateModelType },
    #[display("no model checkpoint in {}", dir.display())]
    NoCheckpoint { dir: PathBuf },
    #[display("{_0}")]
    Model(ModelFileError),
}

impl From<ModelFileError> for ModelLoadError {
    fn from(err: ModelFileError) -> Self {
        ModelLoadError::Model(err)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExperimentConfig {
    pub search: SearchConfig,
    #[serde(default)]
    pub surrogate: Option<SurrogateConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchConfig {
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurrogateConfig {
    #[serde(rename = "Type")]
    pub model_type: String,
}

impl ExperimentConfig {
    pub fn open_in_log_dir<P>(log_dir: P) -> Result<Self, ModelLoadError>
    where
        P: AsRef<Path>,
    {
        let path = log_dir.as_ref().join(EXPERIMENT_CONFIG_FILE);
        let content =
            fs::read_to_string(&path).map_err(|source| ModelLoadError::ConfigUnreadable {
                path: path.clone(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| ModelLoadError::ConfigMalformed { path, source })
    }

    /// Model type of a surrogate-assisted search that has a gradient backend.
    pub fn surrogate_model_type(&self) -> Result<SurrogateModelType, ModelLoadError> {
        if self.search.category != SURROGATED_CATEGORY {
            return Err(ModelLoadError::NotSurrogated {
                category: self.search.category.clone(),
            });
        }
        let surrogate = self
            .surrogate
            .as_ref()
            .ok_or(ModelLoadError::NoSurrogateSection)?;
        let model_type = surrogate.model_type.parse::<SurrogateModelType>().map_err(|_| {
            ModelLoadError::UnknownModelType {
                name: surrogate.model_type.clone(),
            }
        })?;
        match model_type {
            SurrogateModelType::LinearModel | SurrogateModelType::FullyConnectedNN => {
                Ok(model_type)
            }
            SurrogateModelType::DeepSetModel => Err(ModelLoadError::Unsupported { model_type }),
        }
    }
}

/// Path of the `model.json` of the latest checkpoint under `log_dir`.
pub fn latest_model_checkpoint<P>(log_dir: P) -> Result<PathBuf, ModelLoadError>
where
    P: AsRef<Path>,
{
    let model_dir = log_dir.as_ref().join(SURROGATE_MODEL_DIR);
    let checkpoint_dir = |idx: usize| model_dir.join(format!("model{idx}"));
    let count = (0..).take_while(|idx| checkpoint_dir(*idx).is_dir()).count();
    let Some(latest) = count.checked_sub(1) else {
        return Err(ModelLoadError::NoCheckpoint { dir: model_dir });
    };
    Ok(checkpoint_dir(latest).join(MODEL_FILE))
}

/// Builds the gradient oracle for the latest surrogate model of `log_dir`.
///
/// The model must accept `num_features` inputs (the card-pool size).
pub fn load_surrogate_oracle<P>(
    log_dir: P,
    num_features: usize,
) -> Result<Box<dyn GradientOracle>, ModelLoadError>
where
    P: AsRef<Path>,
{
    let log_dir = log_dir.as_ref();
    let model_type = ExperimentConfig::open_in_log_dir(log_dir)?.surrogate_model_type()?;
    let checkpoint = latest_model_checkpoint(log_dir)?;
    let model = SurrogateModelFile::open(&checkpoint)?;
    model.expect_type(model_type)?;
    if model.num_features() != num_features {
        return Err(ModelFileError::InputCount {
            expected: num_features,
            actual: model.num_features(),
        }
        .into());
    }

    let oracle: Box<dyn GradientOracle> = match model_type {
        SurrogateModelType::LinearModel => Box::new(LinearSurrogate::from_model_file(&model)?),
        SurrogateModelType::FullyConnectedNN => {
            Box::new(FullyConnectedSurrogate::from_model_file(&model)?)
        }
        SurrogateModelType::DeepSetModel => {
            return Err(ModelLoadError::Unsupported { model_type });
        }
    };
    Ok(oracle)
}
