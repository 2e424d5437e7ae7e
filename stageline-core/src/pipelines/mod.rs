//! The concrete pipelines, each an explicit builder over the stages.

pub mod feature_engineering;
pub mod inference;
pub mod iris_sweep;
pub mod training;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::PipelinePlan;

pub use training::TrainingInputs;

/// Names accepted by [`plan_for`].
pub const PIPELINE_NAMES: [&str; 4] = [
    feature_engineering::NAME,
    training::NAME,
    inference::NAME,
    iris_sweep::NAME,
];

/// The validated plan of a pipeline, without running it.
pub fn plan_for(name: &str, config: &PipelineConfig) -> Result<PipelinePlan, PipelineError> {
    let pipeline = match name {
        feature_engineering::NAME => feature_engineering::build(config),
        training::NAME => training::build(config, false)?,
        inference::NAME => inference::build(
            config,
            config.inference.random_state,
            &config.feature_engineering.target,
        ),
        iris_sweep::NAME => iris_sweep::build(config)?,
        other => {
            return Err(PipelineError::not_found(format!(
                "pipeline '{other}' (expected one of {})",
                PIPELINE_NAMES.join(", ")
            )));
        }
    };
    let plan = pipeline.plan();
    plan.validate()?;
    Ok(plan)
}
