//! Model stages: train, evaluate, promote and predict.

use crate::artifacts::{Artifact, Metadata};
use crate::error::PipelineError;
use crate::evaluation::{AccuracyFloor, evaluate};
use crate::pipeline::{RunContext, Stage, StageInputs, StageOutputs, StageSpec};
use crate::registry::decide_promotion;
use crate::training::{ModelSpec, train_model};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Pipeline key of the trained classifier.
pub const CLASSIFIER_KEY: &str = "classifier";

/// Fits the configured classifier on the processed train split.
pub struct ModelTrainer {
    pub model: ModelSpec,
    pub target: String,
}

#[async_trait]
impl Stage for ModelTrainer {
    fn spec(&self) -> StageSpec {
        StageSpec::new("model_trainer")
            .bind("dataset_trn", "dataset_trn")
            .output("model", CLASSIFIER_KEY)
    }

    async fn run(&self, ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let train = inputs.take_dataset("dataset_trn")?;
        let model = train_model(&train, &self.target, &self.model, ctx.seed)?;
        let mut metadata = Metadata::new();
        metadata.insert("model_type".into(), json!(model.model_type));
        metadata.insert("hyperparameters".into(), serde_json::to_value(&self.model)?);
        Ok(StageOutputs::new().with_metadata("model", Artifact::Model(model), metadata))
    }
}

/// Scores the classifier on both splits and attaches the scores to the
/// classifier artifact.
pub struct ModelEvaluator {
    pub target: String,
    pub floor: AccuracyFloor,
}

#[async_trait]
impl Stage for ModelEvaluator {
    fn spec(&self) -> StageSpec {
        StageSpec::new("model_evaluator")
            .bind("model", CLASSIFIER_KEY)
            .bind("dataset_trn", "dataset_trn")
            .bind("dataset_tst", "dataset_tst")
            .output("accuracy", "test_accuracy")
    }

    async fn run(&self, ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let model_id = inputs.artifact_id("model")?.to_string();
        let model = inputs.take_model("model")?;
        let train = inputs.take_dataset("dataset_trn")?;
        let test = inputs.take_dataset("dataset_tst")?;

        let eval = evaluate(&model, &train, &test, &self.target, self.floor)?;
        let mut metadata = Metadata::new();
        metadata.insert("train_accuracy".into(), json!(eval.train_accuracy));
        metadata.insert("test_accuracy".into(), json!(eval.test_accuracy));
        ctx.store.log_metadata(&model_id, metadata.clone())?;

        Ok(StageOutputs::new().with_metadata("accuracy", Artifact::Metric(eval.test_accuracy), metadata))
    }
}

/// Decides whether the run's model version takes over a stage label.
pub struct ModelPromoter {
    pub stage: String,
    pub threshold: f64,
}

#[async_trait]
impl Stage for ModelPromoter {
    fn spec(&self) -> StageSpec {
        StageSpec::new("model_promoter")
            .bind("accuracy", "test_accuracy")
            .output("promoted", "promoted")
    }

    async fn run(&self, ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let accuracy = inputs.take_metric("accuracy")?;
        let model = ctx.require_model("model_promoter")?;
        let store = &ctx.store;

        let registry = ctx.registry.snapshot().await;
        // an incumbent without a recorded test accuracy is no competitor
        let incumbent = match registry
            .at_stage(&model.name, &self.stage)
            .and_then(|v| v.artifacts.get(CLASSIFIER_KEY))
        {
            Some(id) => store.record(id)?.metric("test_accuracy"),
            None => None,
        };
        let decision = decide_promotion(accuracy, self.threshold, incumbent);

        info!(
            model = %model.name,
            version = model.version,
            stage = %self.stage,
            promoted = decision.promoted(),
            decision = ?decision,
            "Promotion decided"
        );
        let mut metadata = Metadata::new();
        metadata.insert("decision".into(), serde_json::to_value(decision)?);
        metadata.insert("stage".into(), json!(self.stage));
        let outputs =
            StageOutputs::new().with_metadata("promoted", Artifact::Flag(decision.promoted()), metadata);
        // the executor moves the label once the whole run has succeeded
        Ok(if decision.promoted() {
            outputs.with_stage_label(&self.stage)
        } else {
            outputs
        })
    }
}

/// Predicts labels for processed inference rows.
pub struct InferencePredict;

#[async_trait]
impl Stage for InferencePredict {
    fn spec(&self) -> StageSpec {
        StageSpec::new("inference_predict")
            .bind("model", CLASSIFIER_KEY)
            .bind("dataset_inf", "dataset_inf_processed")
            .output("predictions", "predictions")
    }

    async fn run(&self, _ctx: &RunContext, mut inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        let model = inputs.take_model("model")?;
        let dataset = inputs.take_dataset("dataset_inf")?;
        let predictions = model.predict(&dataset)?;
        info!(rows = predictions.len(), "Predictions computed");

        let mut metadata = Metadata::new();
        metadata.insert("row_ids".into(), json!(dataset.row_ids));
        Ok(StageOutputs::new().with_metadata("predictions", Artifact::Predictions(predictions), metadata))
    }
}
