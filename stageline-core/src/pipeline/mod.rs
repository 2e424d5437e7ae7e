//! Explicit pipeline composition: stage specs collected into a validated
//! plan, executed in order with a per-run context.

pub mod context;
pub mod executor;
pub mod fanout;
pub mod plan;
pub mod stage;

pub use context::{ModelRef, RegistryHandle, RunContext};
pub use executor::{Pipeline, PipelineExecutor, RunOutput, RunRecord, RunStatus, StageRecord};
pub use fanout::ParallelFor;
pub use plan::{Binding, PipelinePlan, StageSpec};
pub use stage::{Stage, StageInputs, StageOutput, StageOutputs};
