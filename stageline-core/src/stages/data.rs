//! Data stages: load, split, preprocess, and the inference-time replay of
//! a fitted preprocessing pipeline.

use crate::artifacts::{Artifact, Metadata};
use crate::data::loader::load_dataset;
use crate::data::source::DataSource;
use crate::data::splitter::train_test_split;
use crate::error::PipelineError;
use crate::pipeline::{RunContext, Stage, StageInputs, StageOutputs, StageSpec};
use crate::preprocess::PreprocessPipeline;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Reads the source table and returns either its training rows or the
/// unlabelled inference slice.
pub struct DataLoader {
    source: Box<dyn DataSource>,
    random_state: u64,
    is_inference: bool,
    target: String,
}

impl DataLoader {
    pub fn training(source: Box<dyn DataSource>, random_state: u64, target: &str) -> Self {
        Self {
            source,
            random_state,
            is_inference: false,
            target: target.to_string(),
        }
    }

    pub fn inference(source: Box<dyn DataSource>, random_state: u64, target: &str) -> Self {
        Self {
            is_inference: true,
            ..Self::training(source, random_state, target)
        }
    }
}

#[async_trait]
impl Stage for DataLoader {
    fn spec(&self) -> StageSpec {
        let key = if self.is_inference {
            "dataset_inf"
        } else {
            "raw_dataset"
        };
        StageSpec::new("data_loader").output("dataset", key)
    }

    async fn run(&self, _ctx: &RunContext, _inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let dataset = load_dataset(
            self.source.as_ref(),
            self.random_state,
            self.is_inference,
            &self.target,
        )
        .await?;

        let info = self.source.source_info();
        let mut metadata = Metadata::new();
        metadata.insert("source_type".into(), json!(info.source_type));
        metadata.insert("source".into(), json!(info.location));
        metadata.insert("random_state".into(), json!(self.random_state));
        metadata.insert("is_inference".into(), json!(self.is_inference));
        metadata.insert("rows".into(), json!(dataset.len()));
        Ok(StageOutputs::new().with_metadata("dataset", Artifact::Dataset(dataset), metadata))
    }
}

/// Seeded train/test partition of the loaded rows.
pub struct DataSplitter {
    pub test_size: f64,
    pub seed: u64,
}

#[async_trait]
impl Stage for DataSplitter {
    fn spec(&self) -> StageSpec {
        StageSpec::new("data_splitter")
            .bind("dataset", "raw_dataset")
            .output("dataset_trn", "raw_dataset_trn")
            .output("dataset_tst", "raw_dataset_tst")
    }

    async fn run(&self, _ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let dataset = inputs.take_dataset("dataset")?;
        let (train, test) = train_test_split(&dataset, self.test_size, self.seed)?;
        info!(train_rows = train.len(), test_rows = test.len(), "Dataset split");
        Ok(StageOutputs::new()
            .with("dataset_trn", Artifact::Dataset(train))
            .with("dataset_tst", Artifact::Dataset(test)))
    }
}

/// Fits the preprocessing pipeline on the train split and replays it on
/// the test split.
pub struct DataPreprocessor {
    pub drop_na: bool,
    pub normalize: bool,
    pub drop_columns: Vec<String>,
    pub target: String,
    pub random_state: u64,
}

#[async_trait]
impl Stage for DataPreprocessor {
    fn spec(&self) -> StageSpec {
        StageSpec::new("data_preprocessor")
            .bind("dataset_trn", "raw_dataset_trn")
            .bind("dataset_tst", "raw_dataset_tst")
            .output("dataset_trn", "dataset_trn")
            .output("dataset_tst", "dataset_tst")
            .output("preprocess_pipeline", "preprocess_pipeline")
    }

    async fn run(&self, _ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let train = inputs.take_dataset("dataset_trn")?;
        let test = inputs.take_dataset("dataset_tst")?;
        train.schema.require(&self.target)?;

        let pipeline = PreprocessPipeline::from_flags(
            self.drop_na,
            self.normalize,
            &self.drop_columns,
            &self.target,
        );
        let (train, fitted) = pipeline.fit_transform(&train, &self.target)?;
        let test = fitted.transform(&test)?;
        info!(
            steps = ?fitted.step_names(),
            train_rows = train.len(),
            test_rows = test.len(),
            "Preprocessing pipeline fitted"
        );

        let mut metadata = Metadata::new();
        metadata.insert("random_state".into(), json!(self.random_state));
        metadata.insert("target".into(), json!(self.target));
        Ok(StageOutputs::new()
            .with("dataset_trn", Artifact::Dataset(train))
            .with("dataset_tst", Artifact::Dataset(test))
            .with_metadata("preprocess_pipeline", Artifact::Preprocessor(fitted), metadata))
    }
}

/// Applies a previously fitted preprocessing pipeline to unlabelled rows.
pub struct InferencePreprocessor {
    pub target: String,
}

#[async_trait]
impl Stage for InferencePreprocessor {
    fn spec(&self) -> StageSpec {
        StageSpec::new("inference_preprocessor")
            .bind("dataset_inf", "dataset_inf")
            .bind("preprocess_pipeline", "preprocess_pipeline")
            .output("dataset_inf", "dataset_inf_processed")
    }

    async fn run(&self, _ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let dataset = inputs.take_dataset("dataset_inf")?;
        let fitted = inputs.take_preprocessor("preprocess_pipeline")?;
        if fitted.target != self.target {
            return Err(PipelineError::schema(format!(
                "preprocessing pipeline was fitted with target '{}', not '{}'",
                fitted.target, self.target
            )));
        }
        let processed = fitted.transform_unlabeled(&dataset)?;
        Ok(StageOutputs::new().with("dataset_inf", Artifact::Dataset(processed)))
    }
}
