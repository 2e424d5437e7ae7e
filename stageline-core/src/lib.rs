//! # stageline-core
//!
//! Staged machine-learning pipelines over small tabular datasets:
//! loading with a held-out inference slice, seeded splitting, replayable
//! preprocessing, classifier training, evaluation and registry promotion.
//!
//! Pipelines are plain values. Each stage declares its input and output
//! bindings through a [`pipeline::StageSpec`]; the specs are collected into
//! a [`pipeline::PipelinePlan`] that is validated before anything runs, and
//! the [`pipeline::PipelineExecutor`] passes an explicit
//! [`pipeline::RunContext`] to every stage.

pub mod artifacts;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod persistence;
pub mod pipeline;
pub mod pipelines;
pub mod preprocess;
pub mod registry;
pub mod stages;
pub mod training;

pub use artifacts::{Artifact, ArtifactKind, ArtifactRecord, ArtifactStore};
pub use config::{PipelineConfig, load_config};
pub use error::PipelineError;
pub use pipeline::{PipelineExecutor, RunOutput, RunRecord};
pub use registry::{ModelRegistry, ModelVersion};
