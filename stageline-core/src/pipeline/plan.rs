//! Stage descriptions and the validated plan they are collected into.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Maps a stage-local name to a pipeline artifact key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub local: String,
    pub key: String,
}

/// Name plus input and output bindings of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub inputs: Vec<Binding>,
    pub outputs: Vec<Binding>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Read pipeline artifact `key` as the local input `local`.
    pub fn bind(mut self, local: &str, key: &str) -> Self {
        self.inputs.push(Binding {
            local: local.to_string(),
            key: key.to_string(),
        });
        self
    }

    /// Publish the local output `local` as pipeline artifact `key`.
    pub fn output(mut self, local: &str, key: &str) -> Self {
        self.outputs.push(Binding {
            local: local.to_string(),
            key: key.to_string(),
        });
        self
    }

    /// Pipeline key for a local output name.
    pub fn output_key(&self, local: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|b| b.local == local)
            .map(|b| b.key.as_str())
    }
}

/// Ordered stages plus the artifact keys supplied from outside the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub name: String,
    pub external_inputs: Vec<String>,
    pub stages: Vec<StageSpec>,
}

impl PipelinePlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_inputs: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn external(mut self, key: &str) -> Self {
        self.external_inputs.push(key.to_string());
        self
    }

    pub fn stage(mut self, spec: StageSpec) -> Self {
        self.stages.push(spec);
        self
    }

    /// Check that every input is bound to an external key or the output of
    /// an earlier stage, and that no key is produced twice.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (pos, stage) in self.stages.iter().enumerate() {
            for out in &stage.outputs {
                producers.entry(out.key.as_str()).or_insert(pos);
            }
        }

        let mut names = HashSet::new();
        let mut available: HashSet<&str> = HashSet::new();
        for key in &self.external_inputs {
            if !available.insert(key.as_str()) {
                return Err(PipelineError::plan(format!("external input '{key}' declared twice")));
            }
        }

        for (pos, stage) in self.stages.iter().enumerate() {
            if !names.insert(stage.name.as_str()) {
                return Err(PipelineError::plan(format!("duplicate stage name '{}'", stage.name)));
            }
            let mut locals = HashSet::new();
            for input in &stage.inputs {
                if !locals.insert(input.local.as_str()) {
                    return Err(PipelineError::plan(format!(
                        "stage '{}' binds input '{}' twice",
                        stage.name, input.local
                    )));
                }
                if available.contains(input.key.as_str()) {
                    continue;
                }
                return Err(match producers.get(input.key.as_str()) {
                    Some(&p) if p >= pos => PipelineError::plan(format!(
                        "stage '{}' reads '{}' before stage '{}' produces it",
                        stage.name, input.key, self.stages[p].name
                    )),
                    _ => PipelineError::plan(format!(
                        "stage '{}' input '{}' is not bound to any artifact",
                        stage.name, input.key
                    )),
                });
            }
            for out in &stage.outputs {
                if !available.insert(out.key.as_str()) {
                    return Err(PipelineError::plan(format!(
                        "artifact key '{}' is produced more than once",
                        out.key
                    )));
                }
            }
        }
        Ok(())
    }
}
