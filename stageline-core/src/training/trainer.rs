//! Fit a classifier on every non-target column of a labelled dataset.

use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use crate::training::forest::RandomForest;
use crate::training::knn::KNearest;
use crate::training::model::{Estimator, ModelSpec, TrainedModel};
use crate::training::sgd::LinearSgd;
use serde_json::Value;
use tracing::info;

/// Map label values to class indices in first-appearance order.
pub fn encode_labels(labels: &[Value]) -> Result<(Vec<Value>, Vec<usize>), PipelineError> {
    let mut classes: Vec<Value> = Vec::new();
    let mut encoded = Vec::with_capacity(labels.len());
    for (row, label) in labels.iter().enumerate() {
        if label.is_null() {
            return Err(PipelineError::schema(format!("null label at row {row}")));
        }
        let idx = match classes.iter().position(|c| c == label) {
            Some(idx) => idx,
            None => {
                classes.push(label.clone());
                classes.len() - 1
            }
        };
        encoded.push(idx);
    }
    Ok((classes, encoded))
}

/// Train the model described by `spec` on `data`.
pub fn train_model(
    data: &Dataset,
    target: &str,
    spec: &ModelSpec,
    seed: u64,
) -> Result<TrainedModel, PipelineError> {
    let labels = data.column(target)?;
    let feature_names = data.schema.feature_names(target);
    if feature_names.is_empty() {
        return Err(PipelineError::invalid_input(
            "training data has no feature columns besides the target",
        ));
    }
    let (classes, y) = encode_labels(&labels)?;
    if classes.len() < 2 {
        return Err(PipelineError::invalid_input(format!(
            "training data must contain at least two classes, found {}",
            classes.len()
        )));
    }
    let x = data.feature_matrix(&feature_names)?;
    let n_classes = classes.len();

    let estimator = match spec {
        ModelSpec::Sgd(config) => Estimator::Sgd(LinearSgd::fit(&x, &y, n_classes, config, seed)?),
        ModelSpec::RandomForest(config) => {
            Estimator::RandomForest(RandomForest::fit(&x, &y, n_classes, config, seed)?)
        }
        ModelSpec::KNearest { n_neighbors } => {
            Estimator::KNearest(KNearest::fit(&x, &y, n_classes, *n_neighbors)?)
        }
    };

    info!(
        model_type = %spec.model_type(),
        rows = data.len(),
        features = feature_names.len(),
        classes = n_classes,
        "Model trained"
    );

    Ok(TrainedModel {
        model_type: spec.model_type(),
        feature_names,
        target: target.to_string(),
        classes,
        estimator,
        trained_rows: data.len(),
        trained_at: chrono::Utc::now(),
    })
}
