//! Predict the inference slice with the model version at a stage label.

use crate::config::PipelineConfig;
use crate::data::source::source_from_config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineExecutor, RunOutput};
use crate::stages::{CLASSIFIER_KEY, DataLoader, InferencePredict, InferencePreprocessor};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

pub const NAME: &str = "inference";

pub fn build(config: &PipelineConfig, random_state: u64, target: &str) -> Pipeline {
    Pipeline::new(NAME)
        .external(CLASSIFIER_KEY)
        .external("preprocess_pipeline")
        .stage(DataLoader::inference(
            source_from_config(&config.source),
            random_state,
            target,
        ))
        .stage(InferencePreprocessor {
            target: target.to_string(),
        })
        .stage(InferencePredict)
}

/// Run inference against the version holding `config.inference.stage`.
///
/// The seed and target recorded on the preprocessing pipeline take
/// precedence over configuration so the inference slice matches the rows
/// held out at training time.
pub async fn run(executor: &PipelineExecutor, config: &PipelineConfig) -> Result<RunOutput, PipelineError> {
    config.validate()?;
    let stage = &config.inference.stage;
    let registry = executor.registry().snapshot().await;
    let version = registry.at_stage(&config.model_name, stage).ok_or_else(|| {
        PipelineError::not_found(format!(
            "no version of model '{}' at stage '{stage}'",
            config.model_name
        ))
    })?;

    let mut external = BTreeMap::new();
    for key in [CLASSIFIER_KEY, "preprocess_pipeline"] {
        let id = version.artifacts.get(key).ok_or_else(|| {
            PipelineError::not_found(format!(
                "artifact '{key}' of model '{}' version {}",
                version.model_name, version.version
            ))
        })?;
        external.insert(key.to_string(), id.clone());
    }

    let preprocess = executor.store().record(&external["preprocess_pipeline"])?;
    let random_state = preprocess
        .metadata
        .get("random_state")
        .and_then(Value::as_u64)
        .unwrap_or(config.inference.random_state);
    let target = preprocess
        .metadata
        .get("target")
        .and_then(Value::as_str)
        .unwrap_or(&config.feature_engineering.target)
        .to_string();
    info!(
        model = %version.model_name,
        version = version.version,
        stage = %stage,
        random_state,
        "Running inference"
    );

    executor
        .run(&build(config, random_state, &target), external, random_state)
        .await
}
