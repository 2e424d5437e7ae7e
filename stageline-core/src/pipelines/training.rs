//! Train, evaluate and conditionally promote a new model version.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::evaluation::AccuracyFloor;
use crate::pipeline::{Pipeline, PipelineExecutor, RunOutput};
use crate::pipelines::feature_engineering;
use crate::stages::{ModelEvaluator, ModelPromoter, ModelTrainer};
use crate::training::ModelSpec;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const NAME: &str = "training";

/// Datasets to train on. Without both ids the feature-engineering stages
/// run inline.
#[derive(Debug, Clone, Default)]
pub struct TrainingInputs {
    pub train_dataset_id: Option<String>,
    pub test_dataset_id: Option<String>,
}

impl TrainingInputs {
    fn dataset_ids(&self) -> Option<(&str, &str)> {
        match (&self.train_dataset_id, &self.test_dataset_id) {
            (Some(trn), Some(tst)) => Some((trn.as_str(), tst.as_str())),
            _ => None,
        }
    }
}

/// Build the training pipeline. Fails with `UnsupportedModelType` before
/// any stage exists when the configured model type is unknown.
pub fn build(config: &PipelineConfig, external_datasets: bool) -> Result<Pipeline, PipelineError> {
    let training = &config.training;
    let model = ModelSpec::from_config(&training.model_type, training)?;
    let target = config.feature_engineering.target.clone();

    let mut pipeline = Pipeline::new(NAME).registers_model(&config.model_name);
    pipeline = if external_datasets {
        pipeline
            .external("dataset_trn")
            .external("dataset_tst")
            .external("preprocess_pipeline")
    } else {
        feature_engineering::with_stages(pipeline, config)
    };

    Ok(pipeline
        .stage(ModelTrainer {
            model,
            target: target.clone(),
        })
        .stage(ModelEvaluator {
            target,
            floor: AccuracyFloor {
                train: training.min_train_accuracy,
                test: training.min_test_accuracy,
            },
        })
        .stage(ModelPromoter {
            stage: config.promotion.stage.clone(),
            threshold: config.promotion.min_accuracy,
        }))
}

pub async fn run(
    executor: &PipelineExecutor,
    config: &PipelineConfig,
    inputs: &TrainingInputs,
) -> Result<RunOutput, PipelineError> {
    config.validate()?;
    let seed = config.training.seed;

    let Some((trn, tst)) = inputs.dataset_ids() else {
        if inputs.train_dataset_id.is_some() || inputs.test_dataset_id.is_some() {
            warn!("Both dataset ids are needed to skip feature engineering; running it inline");
        }
        return executor.run(&build(config, false)?, BTreeMap::new(), seed).await;
    };

    // the preprocessing pipeline fitted alongside the train split
    let trn_record = executor.store().record(trn)?;
    let preprocess = executor
        .store()
        .find_in_run(&trn_record.run_id, "preprocess_pipeline")?
        .ok_or_else(|| {
            PipelineError::not_found(format!(
                "preprocess_pipeline produced with dataset '{trn}' (run {})",
                trn_record.run_id
            ))
        })?;
    info!(train_dataset_id = trn, test_dataset_id = tst, "Training on existing datasets");

    let mut external = BTreeMap::new();
    external.insert("dataset_trn".to_string(), trn.to_string());
    external.insert("dataset_tst".to_string(), tst.to_string());
    external.insert("preprocess_pipeline".to_string(), preprocess.id);
    executor.run(&build(config, true)?, external, seed).await
}
