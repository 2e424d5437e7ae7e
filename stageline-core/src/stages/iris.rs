//! Stages of the iris sweep: load the table, scale every feature column,
//! and train one k-nearest-neighbour model per neighbour count.

use crate::artifacts::{Artifact, Metadata};
use crate::data::source::DataSource;
use crate::data::splitter::train_test_split;
use crate::error::PipelineError;
use crate::evaluation::accuracy;
use crate::pipeline::{RunContext, Stage, StageInputs, StageOutputs, StageSpec};
use crate::preprocess::{FittedScaler, ScalerKind};
use crate::training::{ModelSpec, train_model};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

pub struct CreateDataset {
    pub source: Box<dyn DataSource>,
}

#[async_trait]
impl Stage for CreateDataset {
    fn spec(&self) -> StageSpec {
        StageSpec::new("create_dataset").output("iris_dataset", "iris_dataset")
    }

    async fn run(&self, _ctx: &RunContext, _inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let dataset = self.source.load().await?;
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!(self.source.source_info().location));
        metadata.insert("rows".into(), json!(dataset.len()));
        Ok(StageOutputs::new().with_metadata("iris_dataset", Artifact::Dataset(dataset), metadata))
    }
}

/// Fits the chosen scaler on every numeric column except the label.
pub struct NormalizeDataset {
    pub scaler: ScalerKind,
    pub label: String,
}

#[async_trait]
impl Stage for NormalizeDataset {
    fn spec(&self) -> StageSpec {
        StageSpec::new("normalize_dataset")
            .bind("iris_dataset", "iris_dataset")
            .output("normalized_iris_dataset", "normalized_iris_dataset")
    }

    async fn run(&self, _ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let dataset = inputs.take_dataset("iris_dataset")?;
        dataset.schema.require(&self.label)?;
        let scaler = FittedScaler::fit(self.scaler, &dataset, std::slice::from_ref(&self.label))?;
        let normalized = scaler.transform(&dataset)?;

        let mut metadata = Metadata::new();
        metadata.insert("scaler".into(), json!(self.scaler));
        metadata.insert("columns".into(), json!(scaler.columns.len()));
        Ok(StageOutputs::new().with_metadata(
            "normalized_iris_dataset",
            Artifact::Dataset(normalized),
            metadata,
        ))
    }
}

/// Trains a k-nearest-neighbour classifier on an internal split and keeps
/// the held-out accuracy as artifact metadata.
pub struct TrainKnn {
    pub n_neighbors: usize,
    pub label: String,
    pub test_size: f64,
    pub split_seed: u64,
}

#[async_trait]
impl Stage for TrainKnn {
    fn spec(&self) -> StageSpec {
        StageSpec::new("train_model")
            .bind("normalized_iris_dataset", "normalized_iris_dataset")
            .output("model", "model")
    }

    async fn run(&self, ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let dataset = inputs.take_dataset("normalized_iris_dataset")?;
        let (train, test) = train_test_split(&dataset, self.test_size, self.split_seed)?;
        let spec = ModelSpec::KNearest {
            n_neighbors: self.n_neighbors,
        };
        let model = train_model(&train, &self.label, &spec, ctx.seed)?;
        let held_out = accuracy(&model.predict(&test)?, &test.column(&self.label)?)?;
        info!(n_neighbors = self.n_neighbors, test_accuracy = held_out, "KNN branch trained");

        let mut metadata = Metadata::new();
        metadata.insert("n_neighbors".into(), json!(self.n_neighbors));
        metadata.insert("test_accuracy".into(), json!(held_out));
        metadata.insert("train_rows".into(), json!(train.len()));
        metadata.insert("test_rows".into(), json!(test.len()));
        Ok(StageOutputs::new().with_metadata("model", Artifact::Model(model), metadata))
    }
}
