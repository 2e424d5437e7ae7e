//! Iris sweep: load, scale, then one k-nearest-neighbour model per
//! neighbour count. Branch models are kept side by side; picking one is
//! left to whoever reads their recorded accuracies.

use crate::config::PipelineConfig;
use crate::data::source::source_from_config;
use crate::error::PipelineError;
use crate::pipeline::{ParallelFor, Pipeline, PipelineExecutor, RunOutput};
use crate::stages::{CreateDataset, NormalizeDataset, TrainKnn};
use std::collections::BTreeMap;

pub const NAME: &str = "iris_sweep";

/// Build the sweep. Fails with a configuration error unless exactly one
/// scaler flag is set.
pub fn build(config: &PipelineConfig) -> Result<Pipeline, PipelineError> {
    let sweep = &config.sweep;
    let scaler = sweep.scaler()?;
    let label = config.feature_engineering.target.clone();
    let (test_size, split_seed) = (sweep.test_size, sweep.split_seed);

    Ok(Pipeline::new(NAME)
        .stage(CreateDataset {
            source: source_from_config(&config.source),
        })
        .stage(NormalizeDataset {
            scaler,
            label: label.clone(),
        })
        .stage(ParallelFor::over(
            "train_model",
            sweep.neighbors.clone(),
            |n_neighbors| TrainKnn {
                n_neighbors,
                label: label.clone(),
                test_size,
                split_seed,
            },
        )))
}

pub async fn run(executor: &PipelineExecutor, config: &PipelineConfig) -> Result<RunOutput, PipelineError> {
    config.validate()?;
    executor
        .run(&build(config)?, BTreeMap::new(), config.training.seed)
        .await
}
