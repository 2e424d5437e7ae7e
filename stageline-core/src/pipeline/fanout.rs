//! Fan one stage out over a list of parameter values.
//!
//! Each branch gets its own clone of the inputs and runs as a separate
//! tokio task. Output `x` of branch `i` is published as `x_<i>` under the
//! pipeline key `<key>_<i>`. Branch results are never merged.

use crate::error::PipelineError;
use crate::pipeline::context::RunContext;
use crate::pipeline::plan::StageSpec;
use crate::pipeline::stage::{Stage, StageInputs, StageOutputs};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span};

/// Branch stages sharing one input binding set.
pub struct ParallelFor {
    name: String,
    branches: Vec<Arc<dyn Stage>>,
}

impl ParallelFor {
    /// Build one branch per value with `make`.
    pub fn over<P, S>(name: &str, values: impl IntoIterator<Item = P>, make: impl Fn(P) -> S) -> Self
    where
        S: Stage + 'static,
    {
        Self {
            name: name.to_string(),
            branches: values
                .into_iter()
                .map(|v| Arc::new(make(v)) as Arc<dyn Stage>)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

#[async_trait]
impl Stage for ParallelFor {
    fn spec(&self) -> StageSpec {
        let mut spec = StageSpec::new(self.name.clone());
        let Some(first) = self.branches.first() else {
            return spec;
        };
        spec.inputs = first.spec().inputs;
        for (i, branch) in self.branches.iter().enumerate() {
            for out in branch.spec().outputs {
                spec = spec.output(&format!("{}_{i}", out.local), &format!("{}_{i}", out.key));
            }
        }
        spec
    }

    async fn run(&self, ctx: &RunContext, inputs: StageInputs) -> Result<StageOutputs, PipelineError> {
        if self.branches.is_empty() {
            return Err(PipelineError::invalid_input(format!(
                "parallel stage '{}' has no branches",
                self.name
            )));
        }

        let mut tasks = JoinSet::new();
        for (i, branch) in self.branches.iter().enumerate() {
            let branch = branch.clone();
            let ctx = ctx.clone();
            let inputs = inputs.clone();
            let span = info_span!("branch", index = i);
            tasks.spawn(
                async move {
                    let name = branch.spec().name;
                    let result = branch
                        .run(&ctx, inputs)
                        .await
                        .map_err(|e| e.in_stage(&format!("{name}[{i}]")));
                    (i, result)
                }
                .instrument(span),
            );
        }

        let mut results: Vec<Option<StageOutputs>> = vec![None; self.branches.len()];
        while let Some(joined) = tasks.join_next().await {
            let (i, result) = joined?;
            debug!(branch = i, ok = result.is_ok(), "Branch finished");
            results[i] = Some(result?);
        }

        let mut merged = StageOutputs::new();
        for (i, outputs) in results.into_iter().enumerate() {
            let outputs = outputs.ok_or_else(|| PipelineError::plan(format!("branch {i} produced no result")))?;
            for (local, output) in outputs.values {
                merged.insert(&format!("{local}_{i}"), output.artifact, output.metadata);
            }
        }
        Ok(merged)
    }
}
