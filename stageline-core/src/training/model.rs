//! Model types, fitted estimators and the schema-bound trained model.

use crate::config::{ForestConfig, SgdConfig, TrainingConfig};
use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use crate::training::forest::RandomForest;
use crate::training::knn::KNearest;
use crate::training::sgd::LinearSgd;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Supported classifier families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "sgd")]
    Sgd,
    #[serde(rename = "rf")]
    RandomForest,
    #[serde(rename = "knn")]
    KNearest,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sgd => "sgd",
            Self::RandomForest => "rf",
            Self::KNearest => "knn",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sgd" => Ok(Self::Sgd),
            "rf" => Ok(Self::RandomForest),
            "knn" => Ok(Self::KNearest),
            other => Err(PipelineError::unsupported_model(other)),
        }
    }
}

/// A model family together with its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum ModelSpec {
    Sgd(SgdConfig),
    RandomForest(ForestConfig),
    KNearest { n_neighbors: usize },
}

impl ModelSpec {
    /// Resolve a training model type against the training configuration.
    ///
    /// Only `sgd` and `rf` are trainable here; k-nearest-neighbour models
    /// come from the sweep, so `knn` is rejected like any unknown type.
    pub fn from_config(model_type: &str, training: &TrainingConfig) -> Result<Self, PipelineError> {
        match model_type.parse::<ModelType>()? {
            ModelType::Sgd => Ok(Self::Sgd(training.sgd.clone())),
            ModelType::RandomForest => Ok(Self::RandomForest(training.forest.clone())),
            ModelType::KNearest => Err(PipelineError::unsupported_model(model_type)),
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Self::Sgd(_) => ModelType::Sgd,
            Self::RandomForest(_) => ModelType::RandomForest,
            Self::KNearest { .. } => ModelType::KNearest,
        }
    }
}

/// Fitted estimator state. Predictions are class indices into
/// [`TrainedModel::classes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Estimator {
    Sgd(LinearSgd),
    RandomForest(RandomForest),
    KNearest(KNearest),
}

impl Estimator {
    pub fn predict_row(&self, row: &[f64]) -> usize {
        match self {
            Self::Sgd(m) => m.predict_row(row),
            Self::RandomForest(m) => m.predict_row(row),
            Self::KNearest(m) => m.predict_row(row),
        }
    }
}

/// A classifier bound to the feature schema it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_type: ModelType,
    pub feature_names: Vec<String>,
    pub target: String,
    /// Label values in first-appearance order of the training data.
    pub classes: Vec<Value>,
    pub estimator: Estimator,
    pub trained_rows: usize,
    pub trained_at: chrono::DateTime<chrono::Utc>,
}

impl TrainedModel {
    /// Predict one label per row. Extra columns (including the target) are
    /// ignored; a missing feature column is a schema mismatch.
    pub fn predict(&self, data: &Dataset) -> Result<Vec<Value>, PipelineError> {
        let missing: Vec<&str> = self
            .feature_names
            .iter()
            .filter(|f| !data.has_column(f))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::schema(format!(
                "model expects feature columns missing from the input: {}",
                missing.join(", ")
            )));
        }
        let x = data.feature_matrix(&self.feature_names)?;
        Ok(x
            .iter()
            .map(|row| self.classes[self.estimator.predict_row(row)].clone())
            .collect())
    }
}
