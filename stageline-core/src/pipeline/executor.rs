//! Pipeline executor: runs stages in plan order, persisting every output
//! only after its stage succeeded, and records the run.

use crate::artifacts::{Artifact, ArtifactStore};
use crate::config::StorageConfig;
use crate::error::PipelineError;
use crate::persistence::{atomic_write_json, load_json};
use crate::pipeline::context::{ModelRef, RegistryHandle, RunContext};
use crate::pipeline::plan::{PipelinePlan, StageSpec};
use crate::pipeline::stage::{Stage, StageInputs, StageOutputs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

/// A named, ordered composition of stages.
pub struct Pipeline {
    pub name: String,
    pub external_inputs: Vec<String>,
    pub stages: Vec<Arc<dyn Stage>>,
    /// Register a new version of this model for each run.
    pub model_name: Option<String>,
}

impl Pipeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            external_inputs: Vec::new(),
            stages: Vec::new(),
            model_name: None,
        }
    }

    pub fn external(mut self, key: &str) -> Self {
        self.external_inputs.push(key.to_string());
        self
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn registers_model(mut self, model_name: &str) -> Self {
        self.model_name = Some(model_name.to_string());
        self
    }

    /// The plan described by the stages' specs.
    pub fn plan(&self) -> PipelinePlan {
        let mut plan = PipelinePlan::new(self.name.clone());
        plan.external_inputs = self.external_inputs.clone();
        plan.stages = self.stages.iter().map(|s| s.spec()).collect();
        plan
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Pipeline artifact key to artifact id.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub pipeline: String,
    pub status: RunStatus,
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<u32>,
    #[serde(default)]
    pub external_inputs: BTreeMap<String, String>,
    pub stages: Vec<StageRecord>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// Artifact id per key across every stage of the run.
    pub fn artifacts(&self) -> BTreeMap<String, String> {
        self.stages
            .iter()
            .flat_map(|s| s.artifacts.clone())
            .collect()
    }
}

/// A persisted artifact produced or consumed by a run.
#[derive(Debug, Clone)]
pub struct RunArtifact {
    pub id: String,
    pub artifact: Artifact,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub record: RunRecord,
    pub artifacts: BTreeMap<String, RunArtifact>,
}

impl RunOutput {
    pub fn artifact(&self, key: &str) -> Result<&Artifact, PipelineError> {
        self.artifacts
            .get(key)
            .map(|a| &a.artifact)
            .ok_or_else(|| PipelineError::not_found(format!("artifact '{key}' in run {}", self.record.run_id)))
    }

    pub fn artifact_id(&self, key: &str) -> Result<&str, PipelineError> {
        self.artifacts
            .get(key)
            .map(|a| a.id.as_str())
            .ok_or_else(|| PipelineError::not_found(format!("artifact '{key}' in run {}", self.record.run_id)))
    }
}

/// Runs pipelines against one storage root.
pub struct PipelineExecutor {
    store: Arc<ArtifactStore>,
    registry: RegistryHandle,
    runs_dir: PathBuf,
}

impl PipelineExecutor {
    pub fn open(storage: &StorageConfig) -> Result<Self, PipelineError> {
        let store = Arc::new(ArtifactStore::open(storage.artifacts_dir())?);
        let registry = RegistryHandle::open(storage.registry_path())?;
        Ok(Self {
            store,
            registry,
            runs_dir: storage.runs_dir(),
        })
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn load_run(&self, run_id: &str) -> Result<RunRecord, PipelineError> {
        if uuid::Uuid::parse_str(run_id).is_err() {
            return Err(PipelineError::not_found(format!("run '{run_id}'")));
        }
        load_json(&self.runs_dir.join(format!("{run_id}.json")))?
            .ok_or_else(|| PipelineError::not_found(format!("run '{run_id}'")))
    }

    /// Run `pipeline` with external inputs given as artifact ids.
    ///
    /// External inputs are linked to the run's model version, if any.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        external: BTreeMap<String, String>,
        seed: u64,
    ) -> Result<RunOutput, PipelineError> {
        pipeline.plan().validate()?;

        let mut values: BTreeMap<String, RunArtifact> = BTreeMap::new();
        for key in &pipeline.external_inputs {
            let id = external.get(key).ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "pipeline '{}' requires external input '{key}'",
                    pipeline.name
                ))
            })?;
            let artifact = self.store.load(id)?;
            values.insert(key.clone(), RunArtifact { id: id.clone(), artifact });
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let model = match &pipeline.model_name {
            Some(name) => {
                let version = self
                    .registry
                    .update(|reg| Ok(reg.create_version(name, &run_id)))
                    .await?;
                Some(ModelRef {
                    name: name.clone(),
                    version_id: version.id,
                    version: version.version,
                })
            }
            None => None,
        };

        if let Some(model) = &model {
            let id = model.version_id.clone();
            let links: Vec<(String, String)> = values
                .iter()
                .map(|(key, value)| (key.clone(), value.id.clone()))
                .collect();
            self.registry
                .update(|reg| {
                    for (key, artifact_id) in &links {
                        reg.link_artifact(&id, key, artifact_id)?;
                    }
                    Ok(())
                })
                .await?;
        }

        let mut record = RunRecord {
            run_id: run_id.clone(),
            pipeline: pipeline.name.clone(),
            status: RunStatus::Running,
            seed,
            model_version: model.as_ref().map(|m| m.version),
            external_inputs: external,
            stages: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        let ctx = RunContext {
            run_id: run_id.clone(),
            pipeline: pipeline.name.clone(),
            seed,
            store: self.store.clone(),
            registry: self.registry.clone(),
            model,
        };
        info!(pipeline = %pipeline.name, run_id = %run_id, "Pipeline run started");

        // requested by a stage, applied after the last stage succeeds
        let mut stage_label: Option<String> = None;
        for stage in &pipeline.stages {
            let spec = stage.spec();
            let started_at = Utc::now();
            let timer = Instant::now();
            let span = info_span!("stage", stage = %spec.name, run_id = %run_id);

            let result = self
                .run_stage(stage.as_ref(), &spec, &ctx, &mut values)
                .instrument(span)
                .await;
            let duration_ms = timer.elapsed().as_millis() as u64;

            match result {
                Ok((artifacts, label)) => {
                    if label.is_some() {
                        stage_label = label;
                    }
                    record.stages.push(StageRecord {
                        name: spec.name.clone(),
                        status: RunStatus::Succeeded,
                        started_at,
                        duration_ms,
                        artifacts,
                        error: None,
                    });
                }
                Err(e) => {
                    let e = e.in_stage(&spec.name);
                    error!(stage = %spec.name, run_id = %run_id, error = %e, "Stage failed");
                    record.stages.push(StageRecord {
                        name: spec.name.clone(),
                        status: RunStatus::Failed,
                        started_at,
                        duration_ms,
                        artifacts: BTreeMap::new(),
                        error: Some(e.to_string()),
                    });
                    // remove the version before the failed record is written
                    let removed = match &ctx.model {
                        Some(model) => {
                            let id = model.version_id.clone();
                            self.registry.update(|reg| Ok(reg.remove(&id))).await.map(|_| ())
                        }
                        None => Ok(()),
                    };
                    self.finish(&mut record, RunStatus::Failed, Some(e.to_string()))?;
                    removed?;
                    return Err(e);
                }
            }
        }

        if let (Some(stage), Some(model)) = (&stage_label, &ctx.model) {
            let id = model.version_id.clone();
            self.registry
                .update(|reg| reg.set_stage(&id, stage, true))
                .await?;
        }
        self.finish(&mut record, RunStatus::Succeeded, None)?;
        info!(pipeline = %pipeline.name, run_id = %run_id, "Pipeline run finished");
        Ok(RunOutput {
            record,
            artifacts: values,
        })
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        spec: &StageSpec,
        ctx: &RunContext,
        values: &mut BTreeMap<String, RunArtifact>,
    ) -> Result<(BTreeMap<String, String>, Option<String>), PipelineError> {
        let mut inputs = StageInputs::new();
        for binding in &spec.inputs {
            let value = values
                .get(&binding.key)
                .ok_or_else(|| PipelineError::plan(format!("artifact '{}' is not available", binding.key)))?;
            inputs.insert(&binding.local, value.artifact.clone(), Some(value.id.clone()));
        }

        let outputs = stage.run(ctx, inputs).await?;
        check_outputs(spec, &outputs)?;
        let stage_label = outputs.stage_label.clone();
        if stage_label.is_some() && ctx.model.is_none() {
            return Err(PipelineError::plan(format!(
                "stage '{}' requested a registry stage but the pipeline registers no model",
                spec.name
            )));
        }

        let mut produced = BTreeMap::new();
        for (local, output) in outputs.values {
            let key = spec
                .output_key(&local)
                .ok_or_else(|| PipelineError::plan(format!("undeclared output '{local}'")))?
                .to_string();
            let saved = self
                .store
                .save(&key, &output.artifact, &ctx.run_id, &spec.name, output.metadata)?;
            produced.insert(key.clone(), saved.id.clone());
            values.insert(
                key,
                RunArtifact {
                    id: saved.id,
                    artifact: output.artifact,
                },
            );
        }

        if let Some(model) = &ctx.model {
            let links = produced.clone();
            self.registry
                .update(|reg| {
                    for (key, id) in &links {
                        reg.link_artifact(&model.version_id, key, id)?;
                    }
                    Ok(())
                })
                .await?;
        }
        info!(outputs = produced.len(), "Stage completed");
        Ok((produced, stage_label))
    }

    fn finish(&self, record: &mut RunRecord, status: RunStatus, error: Option<String>) -> Result<(), PipelineError> {
        record.status = status;
        record.finished_at = Some(Utc::now());
        record.error = error;
        atomic_write_json(&self.runs_dir.join(format!("{}.json", record.run_id)), record)?;
        Ok(())
    }
}

/// A stage must produce exactly the outputs it declares.
fn check_outputs(spec: &StageSpec, outputs: &StageOutputs) -> Result<(), PipelineError> {
    let declared: BTreeSet<&str> = spec.outputs.iter().map(|b| b.local.as_str()).collect();
    let produced: BTreeSet<&str> = outputs.values.keys().map(String::as_str).collect();
    if let Some(missing) = declared.difference(&produced).next() {
        return Err(PipelineError::plan(format!(
            "stage '{}' did not produce declared output '{missing}'",
            spec.name
        )));
    }
    if let Some(extra) = produced.difference(&declared).next() {
        return Err(PipelineError::plan(format!(
            "stage '{}' produced undeclared output '{extra}'",
            spec.name
        )));
    }
    Ok(())
}
