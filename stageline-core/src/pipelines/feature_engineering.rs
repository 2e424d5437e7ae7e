//! Load, split and preprocess the source table.

use crate::config::PipelineConfig;
use crate::data::source::source_from_config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineExecutor, RunOutput};
use crate::stages::{DataLoader, DataPreprocessor, DataSplitter};
use std::collections::BTreeMap;

pub const NAME: &str = "feature_engineering";

/// Append the feature-engineering stages to `pipeline`. Produces
/// `dataset_trn`, `dataset_tst` and `preprocess_pipeline`.
pub fn with_stages(pipeline: Pipeline, config: &PipelineConfig) -> Pipeline {
    let fe = &config.feature_engineering;
    pipeline
        .stage(DataLoader::training(
            source_from_config(&config.source),
            fe.random_state,
            &fe.target,
        ))
        .stage(DataSplitter {
            test_size: fe.test_size,
            seed: fe.split_seed,
        })
        .stage(DataPreprocessor {
            drop_na: fe.drop_na,
            normalize: fe.normalize,
            drop_columns: fe.drop_columns.clone(),
            target: fe.target.clone(),
            random_state: fe.random_state,
        })
}

pub fn build(config: &PipelineConfig) -> Pipeline {
    with_stages(Pipeline::new(NAME), config)
}

pub async fn run(executor: &PipelineExecutor, config: &PipelineConfig) -> Result<RunOutput, PipelineError> {
    config.validate()?;
    executor
        .run(&build(config), BTreeMap::new(), config.feature_engineering.random_state)
        .await
}
