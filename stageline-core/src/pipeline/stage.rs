//! The `Stage` trait and the named values flowing in and out of a stage.

use crate::artifacts::{Artifact, Metadata};
use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use crate::pipeline::context::RunContext;
use crate::pipeline::plan::StageSpec;
use crate::preprocess::FittedPipeline;
use crate::training::model::TrainedModel;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// A single named transformation with declared inputs and outputs.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name and bindings of this stage.
    fn spec(&self) -> StageSpec;

    /// Run with inputs keyed by stage-local name. Outputs must be keyed by
    /// the local names declared in [`Stage::spec`].
    async fn run(&self, ctx: &RunContext, inputs: StageInputs) -> Result<StageOutputs, PipelineError>;
}

/// Stage inputs: artifact values and, where persisted, their ids.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    values: BTreeMap<String, Artifact>,
    ids: BTreeMap<String, String>,
}

impl StageInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, local: &str, artifact: Artifact, id: Option<String>) {
        self.values.insert(local.to_string(), artifact);
        if let Some(id) = id {
            self.ids.insert(local.to_string(), id);
        }
    }

    pub fn take(&mut self, local: &str) -> Result<Artifact, PipelineError> {
        self.values
            .remove(local)
            .ok_or_else(|| PipelineError::not_found(format!("stage input '{local}'")))
    }

    pub fn take_dataset(&mut self, local: &str) -> Result<Dataset, PipelineError> {
        self.take(local)?.into_dataset()
    }

    pub fn take_preprocessor(&mut self, local: &str) -> Result<FittedPipeline, PipelineError> {
        self.take(local)?.into_preprocessor()
    }

    pub fn take_model(&mut self, local: &str) -> Result<TrainedModel, PipelineError> {
        self.take(local)?.into_model()
    }

    pub fn take_metric(&mut self, local: &str) -> Result<f64, PipelineError> {
        self.take(local)?.into_metric()
    }

    /// Stored artifact id of an input.
    pub fn artifact_id(&self, local: &str) -> Result<&str, PipelineError> {
        self.ids
            .get(local)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::not_found(format!("artifact id for stage input '{local}'")))
    }
}

/// One produced value with the metadata to store alongside it.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub artifact: Artifact,
    pub metadata: Metadata,
}

/// Stage outputs keyed by stage-local name.
///
/// `stage_label` asks the executor to move the run's model version to that
/// registry stage once every stage of the run has succeeded.
#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    pub values: BTreeMap<String, StageOutput>,
    pub stage_label: Option<String>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, local: &str, artifact: Artifact) -> Self {
        self.insert(local, artifact, Metadata::new());
        self
    }

    pub fn with_metadata(mut self, local: &str, artifact: Artifact, metadata: Metadata) -> Self {
        self.insert(local, artifact, metadata);
        self
    }

    pub fn with_stage_label(mut self, stage: &str) -> Self {
        self.stage_label = Some(stage.to_string());
        self
    }

    pub fn insert(&mut self, local: &str, artifact: Artifact, metadata: Metadata) {
        self.values
            .insert(local.to_string(), StageOutput { artifact, metadata });
    }

    pub fn get(&self, local: &str) -> Option<&Artifact> {
        self.values.get(local).map(|o| &o.artifact)
    }
}
